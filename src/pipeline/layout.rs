use {
    crate::{
        DescriptorSetLayoutHandle, HandleRegistry, PipelineLayoutHandle,
        VkalError,
    },
    anyhow::{anyhow, Context},
    ash::vk,
    std::collections::HashSet,
};

/// One binding slot in a descriptor set layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    pub fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            count: 1,
            stages,
        }
    }

    /// An array of `count` descriptors at one binding.
    pub fn array(self, count: u32) -> Self {
        Self { count, ..self }
    }

    fn to_vk(self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.count)
            .stage_flags(self.stages)
    }
}

/// Reject binding lists the driver would reject less helpfully.
pub(super) fn check_bindings(
    bindings: &[DescriptorBinding],
) -> Result<(), VkalError> {
    let mut seen = HashSet::with_capacity(bindings.len());
    for binding in bindings {
        if !seen.insert(binding.binding) {
            return Err(
                anyhow!("Binding {} is declared twice", binding.binding).into()
            );
        }
        if binding.count == 0 {
            return Err(
                anyhow!("Binding {} has no descriptors", binding.binding)
                    .into(),
            );
        }
        if binding.stages.is_empty() {
            return Err(anyhow!(
                "Binding {} is not visible to any stage",
                binding.binding
            )
            .into());
        }
    }
    Ok(())
}

/// Create and register a descriptor set layout.
///
/// # Safety
///
/// The layout must be destroyed before the device.
pub unsafe fn create_descriptor_set_layout(
    device: &ash::Device,
    registry: &mut HandleRegistry,
    bindings: &[DescriptorBinding],
) -> Result<DescriptorSetLayoutHandle, VkalError> {
    check_bindings(bindings)?;
    let vk_bindings: Vec<_> =
        bindings.iter().map(|binding| binding.to_vk()).collect();
    let create_info =
        vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
    let layout = device
        .create_descriptor_set_layout(&create_info, None)
        .with_context(|| {
            format!("Error creating descriptor set layout {:#?}", bindings)
        })?;
    registry.descriptor_set_layouts.insert(layout).map_err(|err| {
        device.destroy_descriptor_set_layout(layout, None);
        err
    })
}

/// Create and register a pipeline layout from registered set layouts and
/// push constant ranges.
///
/// # Safety
///
/// The layout must be destroyed before the device.
pub unsafe fn create_pipeline_layout(
    device: &ash::Device,
    registry: &mut HandleRegistry,
    set_layouts: &[DescriptorSetLayoutHandle],
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<PipelineLayoutHandle, VkalError> {
    let raw_set_layouts = set_layouts
        .iter()
        .map(|&handle| registry.descriptor_set_layouts.get(handle).copied())
        .collect::<Result<Vec<_>, _>>()?;
    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&raw_set_layouts)
        .push_constant_ranges(push_constant_ranges);
    let layout = device
        .create_pipeline_layout(&create_info, None)
        .context("Error creating pipeline layout")?;
    registry.pipeline_layouts.insert(layout).map_err(|err| {
        device.destroy_pipeline_layout(layout, None);
        err
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn distinct_bindings_are_accepted() {
        let bindings = [
            DescriptorBinding::new(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            ),
            DescriptorBinding::new(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .array(16),
        ];
        assert!(check_bindings(&bindings).is_ok());
        assert_eq!(bindings[1].count, 16);
    }

    #[test]
    fn duplicate_and_empty_bindings_are_rejected() {
        let uniform = DescriptorBinding::new(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        );
        assert!(check_bindings(&[uniform, uniform]).is_err());
        assert!(check_bindings(&[uniform.array(0)]).is_err());
        assert!(check_bindings(&[DescriptorBinding {
            stages: vk::ShaderStageFlags::empty(),
            ..uniform
        }])
        .is_err());
    }
}
