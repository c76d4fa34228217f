use {
    crate::{HandleRegistry, ShaderModuleHandle, VkalError},
    ash::vk,
    std::io::Cursor,
};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Reinterpret shader byte-code as SPIR-V words.
///
/// The bytes must be a whole number of words and start with the SPIR-V magic
/// number (in either byte order, `read_spv` normalizes it).
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, VkalError> {
    if bytes.is_empty() {
        return Err(VkalError::InvalidShaderCode("no byte-code".to_owned()));
    }
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|err| VkalError::InvalidShaderCode(err.to_string()))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(VkalError::InvalidShaderCode(format!(
            "bad magic number {:#010x}",
            other
        ))),
        None => Err(VkalError::InvalidShaderCode("no words".to_owned())),
    }
}

/// Create and register a shader module from pre-compiled byte-code.
///
/// # Safety
///
/// The module must be destroyed before the device.
pub unsafe fn create_shader_module(
    device: &ash::Device,
    registry: &mut HandleRegistry,
    bytes: &[u8],
) -> Result<ShaderModuleHandle, VkalError> {
    let words = spirv_words(bytes)?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
    let module = device
        .create_shader_module(&create_info, None)
        .map_err(VkalError::from_vk)?;
    match registry.shader_modules.insert(module) {
        Ok(handle) => {
            log::trace!(
                "Shader module {:?} from {} bytes",
                handle,
                bytes.len()
            );
            Ok(handle)
        }
        Err(err) => {
            device.destroy_shader_module(module, None);
            Err(err)
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    fn bytes_of(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_whole_words_with_magic() {
        let words =
            spirv_words(&bytes_of(&[SPIRV_MAGIC, 0x0001_0000, 7])).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 7]);
    }

    #[test]
    fn accepts_big_endian_byte_code() {
        let bytes: Vec<u8> = [SPIRV_MAGIC, 3]
            .iter()
            .flat_map(|word| word.to_be_bytes())
            .collect();
        assert_eq!(spirv_words(&bytes).unwrap()[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_partial_words_and_bad_magic() {
        assert!(matches!(
            spirv_words(&[0x03, 0x02, 0x23]),
            Err(VkalError::InvalidShaderCode(_))
        ));
        assert!(matches!(
            spirv_words(&bytes_of(&[0xdead_beef])),
            Err(VkalError::InvalidShaderCode(_))
        ));
        assert!(matches!(
            spirv_words(&[]),
            Err(VkalError::InvalidShaderCode(_))
        ));
    }
}
