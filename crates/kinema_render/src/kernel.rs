//! Compile-once kernel cache.
//!
//! A kernel's WGSL is assembled from shared fragments the first time it is
//! asked for and kept for the life of the process. Compiled shader modules
//! are cached per device behind a mutex, so concurrent first use still
//! compiles each kernel exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

const COMMON: &str = include_str!("shaders/common.wgsl");
const SAMPLING: &str = include_str!("shaders/sampling.wgsl");
const LIGHT: &str = include_str!("shaders/light.wgsl");
const RESERVOIR: &str = include_str!("shaders/reservoir.wgsl");
const SHADING: &str = include_str!("shaders/shading.wgsl");
const SHADOW_TERMINATOR: &str = include_str!("shaders/shadow_terminator.wgsl");
const LTC: &str = include_str!("shaders/ltc.wgsl");
const DIRECT_LIGHTING: &str = include_str!("shaders/direct_lighting.wgsl");
const LTC_IRRADIANCE: &str = include_str!("shaders/ltc_irradiance.wgsl");

/// Compute kernels shipped with the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Per-pixel direct lighting and G-buffer fill
    DirectLighting,
    /// Batch LTC irradiance queries
    LtcIrradiance,
}

impl Kernel {
    pub const ALL: [Kernel; 2] = [Kernel::DirectLighting, Kernel::LtcIrradiance];

    pub fn label(self) -> &'static str {
        match self {
            Kernel::DirectLighting => "kinema-direct-lighting",
            Kernel::LtcIrradiance => "kinema-ltc-irradiance",
        }
    }

    /// Compute entry point of the composed module.
    pub fn entry_point(self) -> &'static str {
        "main"
    }

    /// Fragments in composition order; the kernel body comes last.
    fn fragments(self) -> &'static [&'static str] {
        match self {
            Kernel::DirectLighting => &[
                COMMON,
                SAMPLING,
                LIGHT,
                RESERVOIR,
                SHADING,
                SHADOW_TERMINATOR,
                LTC,
                DIRECT_LIGHTING,
            ],
            Kernel::LtcIrradiance => &[COMMON, LTC, LTC_IRRADIANCE],
        }
    }

    /// Complete WGSL source, composed on first use.
    pub fn source(self) -> &'static str {
        static DIRECT_LIGHTING_SOURCE: OnceCell<String> = OnceCell::new();
        static LTC_IRRADIANCE_SOURCE: OnceCell<String> = OnceCell::new();

        let cell = match self {
            Kernel::DirectLighting => &DIRECT_LIGHTING_SOURCE,
            Kernel::LtcIrradiance => &LTC_IRRADIANCE_SOURCE,
        };
        cell.get_or_init(|| {
            let source = self.fragments().join("\n");
            log::debug!("Composed {} ({} bytes of WGSL)", self.label(), source.len());
            source
        })
    }
}

/// Compiled shader modules for one device.
#[derive(Default)]
pub struct KernelCache {
    modules: Mutex<HashMap<Kernel, Arc<wgpu::ShaderModule>>>,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module for `kernel`, compiling it on the first request.
    ///
    /// `device` must be the device every earlier call used.
    pub fn get_or_compile(&self, device: &wgpu::Device, kernel: Kernel) -> Arc<wgpu::ShaderModule> {
        let mut modules = self.modules.lock();
        modules
            .entry(kernel)
            .or_insert_with(|| {
                log::info!("Compiling kernel '{}'", kernel.label());
                Arc::new(device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(kernel.label()),
                    source: wgpu::ShaderSource::Wgsl(kernel.source().into()),
                }))
            })
            .clone()
    }

    /// Number of kernels compiled so far.
    pub fn len(&self) -> usize {
        self.modules.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for KernelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelCache").field("compiled", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_have_an_entry_point() {
        for kernel in Kernel::ALL {
            let source = kernel.source();
            assert!(source.contains("@compute"));
            assert!(source.contains(&format!("fn {}(", kernel.entry_point())));
            assert!(source.contains("struct TransformData"));
        }
    }

    #[test]
    fn test_direct_lighting_pulls_in_every_fragment() {
        let source = Kernel::DirectLighting.source();
        for needle in [
            "fn xxhash32_3(",
            "fn light_sample_li(",
            "fn reservoir_add(",
            "fn blinn_phong_evaluate(",
            "fn fresnel_schlick(",
            "fn shadow_terminator(",
            "fn ltc_evaluate(",
        ] {
            assert!(source.contains(needle), "missing {}", needle);
        }
        // Only the batch kernel declares query bindings
        assert!(!source.contains("LtcQuery"));
    }

    #[test]
    fn test_source_is_composed_once() {
        let a = Kernel::LtcIrradiance.source();
        let b = Kernel::LtcIrradiance.source();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_concurrent_first_use_sees_one_source() {
        let addresses: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| Kernel::DirectLighting.source().as_ptr() as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_shared_constants_match_cpu() {
        let source = Kernel::DirectLighting.source();
        assert!(source.contains("const LCG_A: u32 = 1664525u;"));
        assert!(source.contains("const LCG_C: u32 = 1013904223u;"));
        assert!(source.contains("1.5707921083647782"));
        assert!(source.contains("0.04232040013661036"));
    }
}
