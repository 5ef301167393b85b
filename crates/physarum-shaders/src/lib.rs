//! Shaders for the physarum simulation.
//!
//! GLSL sources live in `shaders/` and are compiled to SPIR-V by `build.rs`.

use std::sync::OnceLock;

/// SPIR-V bytecode as emitted by the build script; not necessarily 4-byte aligned.
mod spirv_bytes {
    pub static UPDATE_COMP: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/update.spv"));
    pub static BLUR_COMP: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/blur.spv"));
    pub static DISPLAY_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/display_vert.spv"));
    pub static DISPLAY_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/display_frag.spv"));
}

/// Repack bytes into words. Trailing bytes that do not fill a word are dropped.
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

static UPDATE: OnceLock<Vec<u32>> = OnceLock::new();
static BLUR: OnceLock<Vec<u32>> = OnceLock::new();
static DISPLAY_VERT: OnceLock<Vec<u32>> = OnceLock::new();
static DISPLAY_FRAG: OnceLock<Vec<u32>> = OnceLock::new();

/// Agent sense/steer/move/deposit compute shader.
pub fn update() -> &'static [u32] {
    UPDATE.get_or_init(|| bytes_to_spirv(spirv_bytes::UPDATE_COMP))
}

/// Trail diffuse/decay compute shader.
pub fn blur() -> &'static [u32] {
    BLUR.get_or_init(|| bytes_to_spirv(spirv_bytes::BLUR_COMP))
}

/// Full-screen triangle vertex shader.
pub fn display_vert() -> &'static [u32] {
    DISPLAY_VERT.get_or_init(|| bytes_to_spirv(spirv_bytes::DISPLAY_VERT))
}

/// Ray-cast trail sampling fragment shader.
pub fn display_frag() -> &'static [u32] {
    DISPLAY_FRAG.get_or_init(|| bytes_to_spirv(spirv_bytes::DISPLAY_FRAG))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn every_shader_is_spirv() {
        for (name, words) in [
            ("update", update()),
            ("blur", blur()),
            ("display_vert", display_vert()),
            ("display_frag", display_frag()),
        ] {
            assert_eq!(words[0], SPIRV_MAGIC, "{name}: invalid SPIR-V magic number");
            assert!(words.len() > 20, "{name}: shader too small");
        }
    }

    #[test]
    fn update_seed_is_defined_for_any_elapsed_time() {
        let source = include_str!("../shaders/update.comp");
        assert!(source.contains("floatBitsToUint(pc.time)"));
        assert!(!source.contains("uint(pc.time"));
    }

    #[test]
    fn repacking_is_little_endian() {
        assert_eq!(
            bytes_to_spirv(&[0x03, 0x02, 0x23, 0x07, 0xff]),
            vec![SPIRV_MAGIC]
        );
    }
}
