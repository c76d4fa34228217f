use {
    crate::{limits::MAX_FRAMES_IN_FLIGHT, VkalError},
    serde::Deserialize,
};

const MIB: u64 = 1024 * 1024;

/// Runtime tunables for a [crate::VkalContext].
///
/// Table capacities are not here, see [crate::limits]. Every field has a
/// default so partial TOML documents are fine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VkalConfig {
    pub vertex_buffer_size: u64,
    pub index_buffer_size: u64,
    pub uniform_buffer_size: u64,
    pub staging_buffer_size: u64,

    /// The minimum size of each device-local block that images are
    /// sub-allocated from.
    pub image_block_size: u64,

    /// When set, the vertex and index buffers live in host visible memory and
    /// are written directly instead of through the staging buffer.
    pub host_visible_geometry: bool,

    pub frames_in_flight: usize,
    pub fence_timeout_ns: u64,
    pub prefer_mailbox: bool,

    pub max_descriptor_sets: u32,
    pub max_uniform_descriptors: u32,
    pub max_sampler_descriptors: u32,
    pub max_storage_descriptors: u32,

    pub clear_color: [f32; 4],
}

impl Default for VkalConfig {
    fn default() -> Self {
        Self {
            vertex_buffer_size: 64 * MIB,
            index_buffer_size: 16 * MIB,
            uniform_buffer_size: MIB,
            staging_buffer_size: 32 * MIB,
            image_block_size: 64 * MIB,
            host_visible_geometry: false,
            frames_in_flight: 2,
            fence_timeout_ns: 1_000_000_000,
            prefer_mailbox: true,
            max_descriptor_sets: 64,
            max_uniform_descriptors: 64,
            max_sampler_descriptors: 128,
            max_storage_descriptors: 32,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl VkalConfig {
    /// Parse a TOML document. Keys which are not present keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, VkalError> {
        let config: Self = toml::from_str(source)
            .map_err(|err| VkalError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the context cannot be built with.
    pub fn validate(&self) -> Result<(), VkalError> {
        if self.frames_in_flight == 0
            || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT
        {
            return Err(VkalError::InvalidConfig(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        let buffers = [
            ("vertex_buffer_size", self.vertex_buffer_size),
            ("index_buffer_size", self.index_buffer_size),
            ("uniform_buffer_size", self.uniform_buffer_size),
            ("staging_buffer_size", self.staging_buffer_size),
            ("image_block_size", self.image_block_size),
        ];
        for (name, size) in buffers {
            if size == 0 {
                return Err(VkalError::InvalidConfig(format!(
                    "{} must not be zero",
                    name
                )));
            }
        }
        if self.max_descriptor_sets == 0 {
            return Err(VkalError::InvalidConfig(
                "max_descriptor_sets must not be zero".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    #[test]
    fn defaults_are_valid() {
        let config = VkalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vertex_buffer_size, 64 * 1024 * 1024);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = VkalConfig::from_toml_str(
            r#"
            frames_in_flight = 3
            host_visible_geometry = true
            clear_color = [0.1, 0.2, 0.3, 1.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert!(config.host_visible_geometry);
        assert_eq!(config.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(
            config.staging_buffer_size,
            VkalConfig::default().staging_buffer_size
        );
    }

    #[test]
    fn rejects_too_many_frames_in_flight() {
        let result = VkalConfig::from_toml_str("frames_in_flight = 5");
        assert!(matches!(result, Err(VkalError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_empty_buffers() {
        let config = VkalConfig {
            staging_buffer_size: 0,
            ..VkalConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VkalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_malformed_toml() {
        let result = VkalConfig::from_toml_str("frames_in_flight = \"two\"");
        assert!(matches!(result, Err(VkalError::InvalidConfig(_))));
    }
}
