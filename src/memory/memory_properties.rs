use {
    crate::{PrettyBitflag, PrettySize, VkalError},
    ash::vk,
    indoc::indoc,
};

#[derive(Debug, Clone)]
pub struct MemoryProperties {
    types: Vec<vk::MemoryType>,
    heaps: Vec<vk::MemoryHeap>,
}

impl MemoryProperties {
    /// Get the memory properties for the given physical device.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        let properties = unsafe {
            instance.get_physical_device_memory_properties(physical_device)
        };
        Self {
            types: properties.memory_types_as_slice().to_vec(),
            heaps: properties.memory_heaps_as_slice().to_vec(),
        }
    }

    /// Build memory properties from explicit types and heaps.
    ///
    /// Used to describe hypothetical devices, nothing here talks to the
    /// driver.
    pub fn from_raw(
        types: &[vk::MemoryType],
        heaps: &[vk::MemoryHeap],
    ) -> Self {
        Self {
            types: types.to_vec(),
            heaps: heaps.to_vec(),
        }
    }

    pub fn heaps(&self) -> &[vk::MemoryHeap] {
        &self.heaps
    }

    pub fn types(&self) -> &[vk::MemoryType] {
        &self.types
    }

    /// Find the first memory type allowed by `memory_type_bits` whose
    /// property flags include every requested flag.
    ///
    /// There is no ranking. A type with extra flags is acceptable, a type
    /// missing any requested flag never is.
    pub fn find_memory_type_index(
        &self,
        memory_type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Result<usize, VkalError> {
        self.types
            .iter()
            .enumerate()
            .find(|(index, memory_type)| {
                let is_allowed_type = memory_type_bits & (1 << index) != 0;
                is_allowed_type && memory_type.property_flags.contains(required)
            })
            .map(|(index, _)| index)
            .ok_or(VkalError::NoSupportedTypeForProperties(
                PrettyBitflag(memory_type_bits),
                required,
            ))
    }

    /// The property flags of a memory type index.
    pub fn flags_for(
        &self,
        memory_type_index: usize,
    ) -> vk::MemoryPropertyFlags {
        self.types
            .get(memory_type_index)
            .map(|memory_type| memory_type.property_flags)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for MemoryProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("# Memory Properties\n\n## Memory Types\n\n")?;

        for (index, memory_type) in self.types.iter().enumerate() {
            f.write_fmt(format_args!(
                indoc!(
                    "
                    [{}] heap {} {:?}
                    "
                ),
                index, memory_type.heap_index, memory_type.property_flags,
            ))?;
        }

        f.write_str("\n## Memory Heaps\n\n")?;

        for (index, heap) in self.heaps.iter().enumerate() {
            f.write_fmt(format_args!(
                indoc!(
                    "
                    [{}] {} {:?}
                    "
                ),
                index,
                PrettySize(heap.size),
                heap.flags,
            ))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    fn memory_type(flags: vk::MemoryPropertyFlags) -> vk::MemoryType {
        vk::MemoryType {
            property_flags: flags,
            heap_index: 0,
        }
    }

    fn discrete_gpu() -> MemoryProperties {
        MemoryProperties::from_raw(
            &[
                memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL),
                memory_type(
                    vk::MemoryPropertyFlags::HOST_VISIBLE
                        | vk::MemoryPropertyFlags::HOST_COHERENT,
                ),
                memory_type(
                    vk::MemoryPropertyFlags::HOST_VISIBLE
                        | vk::MemoryPropertyFlags::HOST_CACHED,
                ),
            ],
            &[vk::MemoryHeap {
                size: 1024,
                flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
            }],
        )
    }

    #[test]
    fn first_superset_wins() {
        let properties = discrete_gpu();
        let index = properties
            .find_memory_type_index(
                0b111,
                vk::MemoryPropertyFlags::HOST_VISIBLE,
            )
            .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn type_bits_restrict_the_search() {
        let properties = discrete_gpu();
        let index = properties
            .find_memory_type_index(
                0b100,
                vk::MemoryPropertyFlags::HOST_VISIBLE,
            )
            .unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn never_falls_back_to_partial_matches() {
        let properties = discrete_gpu();
        let result = properties.find_memory_type_index(
            0b111,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert!(matches!(
            result,
            Err(VkalError::NoSupportedTypeForProperties(_, _))
        ));
    }

    #[test]
    fn display_lists_types_and_heaps() {
        let report = format!("{}", discrete_gpu());
        assert!(report.contains("## Memory Types"));
        assert!(report.contains("[2] heap 0"));
        assert!(report.contains("1.00 kib"));
    }
}
