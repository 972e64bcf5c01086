//! Capability negotiation.
//!
//! A [`Capability`] is one boolean toggle of `VkPhysicalDeviceFeatures`. All
//! lookups go through [`CAPABILITY_TABLE`], so support checks and enable
//! requests share one field mapping.

use ash::vk;
use std::fmt;
use std::str::FromStr;

use crate::error::VkCoreError;

/// One row of the capability table: identifier, Vulkan field name and
/// accessors over the feature struct.
#[derive(Clone, Copy)]
pub struct CapabilityEntry {
    pub capability: Capability,
    pub name: &'static str,
    pub get: fn(&vk::PhysicalDeviceFeatures) -> vk::Bool32,
    pub set: fn(&mut vk::PhysicalDeviceFeatures),
}

macro_rules! capability_table {
    ($($variant:ident => $field:ident, $name:literal;)*) => {
        /// Named optional hardware feature.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Capability {
            $($variant,)*
        }

        /// Rows are in declaration order of [`Capability`].
        pub static CAPABILITY_TABLE: &[CapabilityEntry] = &[
            $(CapabilityEntry {
                capability: Capability::$variant,
                name: $name,
                get: |features: &vk::PhysicalDeviceFeatures| features.$field,
                set: |features: &mut vk::PhysicalDeviceFeatures| features.$field = vk::TRUE,
            },)*
        ];
    };
}

capability_table! {
    RobustBufferAccess => robust_buffer_access, "robustBufferAccess";
    FullDrawIndexUint32 => full_draw_index_uint32, "fullDrawIndexUint32";
    ImageCubeArray => image_cube_array, "imageCubeArray";
    IndependentBlend => independent_blend, "independentBlend";
    GeometryShader => geometry_shader, "geometryShader";
    TessellationShader => tessellation_shader, "tessellationShader";
    SampleRateShading => sample_rate_shading, "sampleRateShading";
    DualSrcBlend => dual_src_blend, "dualSrcBlend";
    LogicOp => logic_op, "logicOp";
    MultiDrawIndirect => multi_draw_indirect, "multiDrawIndirect";
    DrawIndirectFirstInstance => draw_indirect_first_instance, "drawIndirectFirstInstance";
    DepthClamp => depth_clamp, "depthClamp";
    DepthBiasClamp => depth_bias_clamp, "depthBiasClamp";
    FillModeNonSolid => fill_mode_non_solid, "fillModeNonSolid";
    DepthBounds => depth_bounds, "depthBounds";
    WideLines => wide_lines, "wideLines";
    LargePoints => large_points, "largePoints";
    AlphaToOne => alpha_to_one, "alphaToOne";
    MultiViewport => multi_viewport, "multiViewport";
    SamplerAnisotropy => sampler_anisotropy, "samplerAnisotropy";
    TextureCompressionEtc2 => texture_compression_etc2, "textureCompressionETC2";
    TextureCompressionAstcLdr => texture_compression_astc_ldr, "textureCompressionASTC_LDR";
    TextureCompressionBc => texture_compression_bc, "textureCompressionBC";
    OcclusionQueryPrecise => occlusion_query_precise, "occlusionQueryPrecise";
    PipelineStatisticsQuery => pipeline_statistics_query, "pipelineStatisticsQuery";
    VertexPipelineStoresAndAtomics => vertex_pipeline_stores_and_atomics, "vertexPipelineStoresAndAtomics";
    FragmentStoresAndAtomics => fragment_stores_and_atomics, "fragmentStoresAndAtomics";
    ShaderTessellationAndGeometryPointSize => shader_tessellation_and_geometry_point_size, "shaderTessellationAndGeometryPointSize";
    ShaderImageGatherExtended => shader_image_gather_extended, "shaderImageGatherExtended";
    ShaderStorageImageExtendedFormats => shader_storage_image_extended_formats, "shaderStorageImageExtendedFormats";
    ShaderStorageImageMultisample => shader_storage_image_multisample, "shaderStorageImageMultisample";
    ShaderStorageImageReadWithoutFormat => shader_storage_image_read_without_format, "shaderStorageImageReadWithoutFormat";
    ShaderStorageImageWriteWithoutFormat => shader_storage_image_write_without_format, "shaderStorageImageWriteWithoutFormat";
    ShaderUniformBufferArrayDynamicIndexing => shader_uniform_buffer_array_dynamic_indexing, "shaderUniformBufferArrayDynamicIndexing";
    ShaderSampledImageArrayDynamicIndexing => shader_sampled_image_array_dynamic_indexing, "shaderSampledImageArrayDynamicIndexing";
    ShaderStorageBufferArrayDynamicIndexing => shader_storage_buffer_array_dynamic_indexing, "shaderStorageBufferArrayDynamicIndexing";
    ShaderStorageImageArrayDynamicIndexing => shader_storage_image_array_dynamic_indexing, "shaderStorageImageArrayDynamicIndexing";
    ShaderClipDistance => shader_clip_distance, "shaderClipDistance";
    ShaderCullDistance => shader_cull_distance, "shaderCullDistance";
    ShaderFloat64 => shader_float64, "shaderFloat64";
    ShaderInt64 => shader_int64, "shaderInt64";
    ShaderInt16 => shader_int16, "shaderInt16";
    ShaderResourceResidency => shader_resource_residency, "shaderResourceResidency";
    ShaderResourceMinLod => shader_resource_min_lod, "shaderResourceMinLod";
    SparseBinding => sparse_binding, "sparseBinding";
    SparseResidencyBuffer => sparse_residency_buffer, "sparseResidencyBuffer";
    SparseResidencyImage2D => sparse_residency_image2_d, "sparseResidencyImage2D";
    SparseResidencyImage3D => sparse_residency_image3_d, "sparseResidencyImage3D";
    SparseResidency2Samples => sparse_residency2_samples, "sparseResidency2Samples";
    SparseResidency4Samples => sparse_residency4_samples, "sparseResidency4Samples";
    SparseResidency8Samples => sparse_residency8_samples, "sparseResidency8Samples";
    SparseResidency16Samples => sparse_residency16_samples, "sparseResidency16Samples";
    SparseResidencyAliased => sparse_residency_aliased, "sparseResidencyAliased";
    VariableMultisampleRate => variable_multisample_rate, "variableMultisampleRate";
    InheritedQueries => inherited_queries, "inheritedQueries";
}

impl Capability {
    fn entry(self) -> &'static CapabilityEntry {
        &CAPABILITY_TABLE[self as usize]
    }

    /// Vulkan field name, e.g. `"geometryShader"`.
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CAPABILITY_TABLE
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.capability)
    }

    pub fn is_enabled_in(self, features: &vk::PhysicalDeviceFeatures) -> bool {
        (self.entry().get)(features) == vk::TRUE
    }

    pub fn enable_in(self, features: &mut vk::PhysicalDeviceFeatures) {
        (self.entry().set)(features)
    }

    pub fn all() -> impl Iterator<Item = Capability> {
        CAPABILITY_TABLE.iter().map(|entry| entry.capability)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = VkCoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s.trim()).ok_or_else(|| VkCoreError::InvalidConfig {
            key: "capability".to_string(),
            reason: format!("unknown capability name '{}'", s.trim()),
        })
    }
}

/// Something that advertises a set of `T`.
pub trait Advertises<T: ?Sized> {
    fn advertises(&self, item: &T) -> bool;
}

impl Advertises<Capability> for vk::PhysicalDeviceFeatures {
    fn advertises(&self, item: &Capability) -> bool {
        item.is_enabled_in(self)
    }
}

impl<S: AsRef<str>, T: AsRef<str>> Advertises<T> for [S] {
    fn advertises(&self, item: &T) -> bool {
        self.iter().any(|available| available.as_ref() == item.as_ref())
    }
}

impl<S: AsRef<str>, T: AsRef<str>> Advertises<T> for Vec<S> {
    fn advertises(&self, item: &T) -> bool {
        self.as_slice().advertises(item)
    }
}

/// True when `required` is empty or every element of it is advertised by
/// `available`. Order and duplicates in `required` do not matter.
pub fn all_required_supported<A, T>(available: &A, required: &[T]) -> bool
where
    A: Advertises<T> + ?Sized,
{
    required.iter().all(|item| available.advertises(item))
}

/// Required items `available` lacks, deduplicated, in request order.
pub fn missing_required<A, T>(available: &A, required: &[T]) -> Vec<T>
where
    A: Advertises<T> + ?Sized,
    T: Clone + PartialEq,
{
    let mut missing: Vec<T> = Vec::new();
    for item in required {
        if !available.advertises(item) && !missing.contains(item) {
            missing.push(item.clone());
        }
    }
    missing
}

/// Feature struct with exactly the requested capabilities enabled.
///
/// Capabilities that are available but not requested stay disabled.
pub fn requested_features(required: &[Capability]) -> vk::PhysicalDeviceFeatures {
    let mut features = vk::PhysicalDeviceFeatures::default();
    for capability in required {
        capability.enable_in(&mut features);
    }
    features
}

/// Every capability `features` reports as available.
pub fn advertised_capabilities(features: &vk::PhysicalDeviceFeatures) -> Vec<Capability> {
    Capability::all()
        .filter(|capability| capability.is_enabled_in(features))
        .collect()
}
