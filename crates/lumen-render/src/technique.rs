//! Render techniques described as data.
//!
//! A technique is a [`RenderGraphDesc`]: the attachments after the swapchain
//! image, their load/store ops and clear values, and an ordered list of
//! subpasses. Subpass 0 draws the scene's drawables in parallel; every later
//! subpass draws one full-screen triangle that reads earlier outputs as
//! input attachments.
//!
//! Descriptor set convention:
//! - scene subpass: set 0 holds the frame uniform buffer at binding 0, set 1
//!   is the drawable's material;
//! - full-screen subpass: set 0 holds one input attachment per entry of the
//!   subpass's input list at bindings `0..n`, optionally followed by the
//!   frame uniform buffer at binding `n`.

use ash::vk;
use lumen_core::{validate_subpasses, SubpassInfo, PRESENT_ATTACHMENT};
use lumen_gpu::{is_depth_stencil_format, AttachmentSpec, LoadStoreInfo, ShaderResource};

use crate::error::{RenderError, Result};

/// Descriptor set index of per-frame resources.
pub const FRAME_SET: u32 = 0;
/// Descriptor set index of the drawable's material (scene subpass only).
pub const MATERIAL_SET: u32 = 1;
/// Binding of the frame uniform buffer in the scene subpass.
pub const FRAME_UNIFORM_BINDING: u32 = 0;

/// Names of the built-in presets.
pub const TECHNIQUES: [&str; 4] = ["single_pass", "depth_multi_pass", "deferred", "ssao"];

/// Clear value of one attachment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    Depth(f32),
}

impl ClearValue {
    pub const BLACK: Self = Self::Color([0.0, 0.0, 0.0, 0.0]);
    pub const FAR: Self = Self::Depth(1.0);

    /// Convert to the Vulkan union.
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::Depth(depth) => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
            },
        }
    }
}

/// What a subpass draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubpassDraws {
    /// Every drawable of the scene, recorded in parallel.
    SceneGeometry,
    /// One full-screen triangle, recorded inline.
    FullScreen,
}

/// One subpass of a technique.
#[derive(Clone, Debug)]
pub struct SubpassDesc {
    pub info: SubpassInfo,
    /// Set 0 declarations of the subpass's shaders.
    pub resources: Vec<ShaderResource>,
    pub draws: SubpassDraws,
}

impl SubpassDesc {
    /// Scene subpass writing `outputs`.
    pub fn scene(outputs: impl Into<Vec<u32>>) -> Self {
        Self {
            info: SubpassInfo::writes(outputs),
            resources: vec![ShaderResource::uniform_buffer(
                FRAME_SET,
                FRAME_UNIFORM_BINDING,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )],
            draws: SubpassDraws::SceneGeometry,
        }
    }

    /// Full-screen subpass reading `inputs` and writing `outputs`.
    pub fn full_screen(inputs: impl Into<Vec<u32>>, outputs: impl Into<Vec<u32>>) -> Self {
        let info = SubpassInfo::new(inputs, outputs);
        let resources = (0..info.inputs.len() as u32)
            .map(|binding| ShaderResource::input_attachment(FRAME_SET, binding))
            .collect();
        Self {
            info,
            resources,
            draws: SubpassDraws::FullScreen,
        }
    }

    /// Add the frame uniform buffer after the input attachments.
    pub fn with_frame_uniforms(mut self) -> Self {
        let binding = self.resources.len() as u32;
        self.resources.push(ShaderResource::uniform_buffer(
            FRAME_SET,
            binding,
            vk::ShaderStageFlags::FRAGMENT,
        ));
        self
    }

    /// Binding of the frame uniform buffer, if the subpass declares one.
    pub fn frame_uniform_binding(&self) -> Option<u32> {
        self.resources
            .iter()
            .find(|r| r.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER)
            .map(|r| r.binding)
    }
}

/// A complete technique.
#[derive(Clone, Debug)]
pub struct RenderGraphDesc {
    pub name: String,
    /// Attachments `1..`; attachment 0 is the swapchain image.
    pub attachments: Vec<AttachmentSpec>,
    /// One entry per attachment, swapchain image included.
    pub load_store: Vec<LoadStoreInfo>,
    /// One entry per attachment, swapchain image included.
    pub clear_values: Vec<ClearValue>,
    pub subpasses: Vec<SubpassDesc>,
}

impl RenderGraphDesc {
    /// Look up a preset by name.
    pub fn by_name(name: &str, depth_format: vk::Format) -> Result<Self> {
        let desc = match name {
            "single_pass" => Self::single_pass(depth_format),
            "depth_multi_pass" => Self::depth_multi_pass(depth_format),
            "deferred" => Self::deferred(depth_format),
            "ssao" => Self::ssao(depth_format),
            other => {
                return Err(RenderError::Config(format!(
                    "unknown technique '{other}' (expected one of {})",
                    TECHNIQUES.join(", ")
                )))
            }
        };
        desc.validate()?;
        Ok(desc)
    }

    /// Forward shading straight into the swapchain image.
    ///
    /// Attachments: 0 swapchain, 1 depth.
    pub fn single_pass(depth_format: vk::Format) -> Self {
        Self {
            name: "single_pass".to_string(),
            attachments: vec![AttachmentSpec::depth(depth_format, false)],
            load_store: vec![LoadStoreInfo::clear_store(), LoadStoreInfo::clear_discard()],
            clear_values: vec![ClearValue::BLACK, ClearValue::FAR],
            subpasses: vec![SubpassDesc::scene([PRESENT_ATTACHMENT, 1])],
        }
    }

    /// Shade into an HDR target, then resolve it with depth in a second
    /// subpass.
    ///
    /// Attachments: 0 swapchain, 1 HDR colour, 2 depth.
    pub fn depth_multi_pass(depth_format: vk::Format) -> Self {
        Self {
            name: "depth_multi_pass".to_string(),
            attachments: vec![
                AttachmentSpec::color_input(vk::Format::R16G16B16A16_SFLOAT),
                AttachmentSpec::depth(depth_format, true),
            ],
            load_store: vec![
                LoadStoreInfo::clear_store(),
                LoadStoreInfo::clear_discard(),
                LoadStoreInfo::clear_discard(),
            ],
            clear_values: vec![ClearValue::BLACK, ClearValue::BLACK, ClearValue::FAR],
            subpasses: vec![
                SubpassDesc::scene([1, 2]),
                SubpassDesc::full_screen([1, 2], [PRESENT_ATTACHMENT]),
            ],
        }
    }

    /// G-buffer fill followed by a lighting pass.
    ///
    /// Attachments: 0 swapchain, 1 albedo, 2 normal, 3 position, 4 depth.
    pub fn deferred(depth_format: vk::Format) -> Self {
        Self {
            name: "deferred".to_string(),
            attachments: vec![
                AttachmentSpec::color_input(vk::Format::R8G8B8A8_UNORM),
                AttachmentSpec::color_input(vk::Format::R16G16B16A16_SFLOAT),
                AttachmentSpec::color_input(vk::Format::R16G16B16A16_SFLOAT),
                AttachmentSpec::depth(depth_format, false),
            ],
            load_store: vec![
                LoadStoreInfo::clear_store(),
                LoadStoreInfo::clear_discard(),
                LoadStoreInfo::clear_discard(),
                LoadStoreInfo::clear_discard(),
                LoadStoreInfo::clear_discard(),
            ],
            clear_values: vec![
                ClearValue::BLACK,
                ClearValue::BLACK,
                ClearValue::BLACK,
                ClearValue::BLACK,
                ClearValue::FAR,
            ],
            subpasses: vec![
                SubpassDesc::scene([1, 2, 3, 4]),
                SubpassDesc::full_screen([1, 2, 3], [PRESENT_ATTACHMENT]).with_frame_uniforms(),
            ],
        }
    }

    /// Deferred shading with an ambient-occlusion subpass between the
    /// G-buffer fill and lighting.
    ///
    /// Attachments: 0 swapchain, 1 albedo, 2 normal, 3 position, 4 AO, 5 depth.
    pub fn ssao(depth_format: vk::Format) -> Self {
        Self {
            name: "ssao".to_string(),
            attachments: vec![
                AttachmentSpec::color_input(vk::Format::R8G8B8A8_UNORM),
                AttachmentSpec::color_input(vk::Format::R16G16B16A16_SFLOAT),
                AttachmentSpec::color_input(vk::Format::R16G16B16A16_SFLOAT),
                AttachmentSpec::color_input(vk::Format::R8_UNORM),
                AttachmentSpec::depth(depth_format, false),
            ],
            load_store: vec![
                LoadStoreInfo::clear_store(),
                LoadStoreInfo::clear_discard(),
                LoadStoreInfo::clear_discard(),
                LoadStoreInfo::clear_discard(),
                LoadStoreInfo::clear_discard(),
                LoadStoreInfo::clear_discard(),
            ],
            clear_values: vec![
                ClearValue::BLACK,
                ClearValue::BLACK,
                ClearValue::BLACK,
                ClearValue::BLACK,
                ClearValue::Color([1.0; 4]),
                ClearValue::FAR,
            ],
            subpasses: vec![
                SubpassDesc::scene([1, 2, 3, 5]),
                SubpassDesc::full_screen([2, 3], [4]).with_frame_uniforms(),
                SubpassDesc::full_screen([1, 4], [PRESENT_ATTACHMENT]),
            ],
        }
    }

    /// Replace the clear colour of the swapchain image.
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_values[PRESENT_ATTACHMENT as usize] = ClearValue::Color(color);
        self
    }

    /// Total attachment count, swapchain image included.
    pub fn attachment_count(&self) -> usize {
        self.attachments.len() + 1
    }

    /// The subpass infos, in order.
    pub fn subpass_infos(&self) -> Vec<SubpassInfo> {
        self.subpasses.iter().map(|s| s.info.clone()).collect()
    }

    /// Clear values in Vulkan form.
    pub fn vk_clear_values(&self) -> Vec<vk::ClearValue> {
        self.clear_values.iter().map(|c| c.to_vk()).collect()
    }

    /// Check the description against the recording model.
    pub fn validate(&self) -> Result<()> {
        let count = self.attachment_count();
        validate_subpasses(&self.subpass_infos(), count)?;

        if self.load_store.len() != count || self.clear_values.len() != count {
            return Err(RenderError::Config(format!(
                "{}: {} attachments but {} load/store and {} clear entries",
                self.name,
                count,
                self.load_store.len(),
                self.clear_values.len()
            )));
        }

        for (index, spec) in self.attachments.iter().enumerate() {
            let depth = is_depth_stencil_format(spec.format);
            let clear = self.clear_values[index + 1];
            if depth != matches!(clear, ClearValue::Depth(_)) {
                return Err(RenderError::Config(format!(
                    "{}: attachment {} clear value {clear:?} does not match its format",
                    self.name,
                    index + 1
                )));
            }
        }
        if matches!(self.clear_values[0], ClearValue::Depth(_)) {
            return Err(RenderError::Config(format!(
                "{}: swapchain image needs a colour clear value",
                self.name
            )));
        }

        for (index, subpass) in self.subpasses.iter().enumerate() {
            self.validate_subpass(index, subpass)?;
        }
        Ok(())
    }

    fn validate_subpass(&self, index: usize, subpass: &SubpassDesc) -> Result<()> {
        let fail = |msg: String| Err(RenderError::Config(format!("{} subpass {index}: {msg}", self.name)));

        let expected = if index == 0 {
            SubpassDraws::SceneGeometry
        } else {
            SubpassDraws::FullScreen
        };
        if subpass.draws != expected {
            return fail(format!("expected {expected:?}, found {:?}", subpass.draws));
        }

        if subpass.resources.iter().any(|r| r.set != FRAME_SET) {
            return fail(format!("declared resources must live in set {FRAME_SET}"));
        }

        let uniforms = subpass
            .resources
            .iter()
            .filter(|r| r.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER)
            .count();
        if uniforms > 1 {
            return fail("at most one uniform buffer is supported".to_string());
        }

        let input_bindings: Vec<u32> = subpass
            .resources
            .iter()
            .filter(|r| r.descriptor_type == vk::DescriptorType::INPUT_ATTACHMENT)
            .map(|r| r.binding)
            .collect();
        let expected_bindings: Vec<u32> = (0..subpass.info.inputs.len() as u32).collect();
        if input_bindings != expected_bindings {
            return fail(format!(
                "{} inputs need input attachments at bindings {expected_bindings:?}, found {input_bindings:?}",
                subpass.info.inputs.len()
            ));
        }

        if subpass.draws == SubpassDraws::SceneGeometry
            && subpass.frame_uniform_binding() != Some(FRAME_UNIFORM_BINDING)
        {
            return fail(format!(
                "scene subpass needs the frame uniform buffer at binding {FRAME_UNIFORM_BINDING}"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn presets_validate() {
        for name in TECHNIQUES {
            let desc = RenderGraphDesc::by_name(name, DEPTH).unwrap();
            assert_eq!(desc.name, name);
        }
    }

    #[test]
    fn every_preset_subpass_has_compiled_shaders() {
        let shaders = lumen_shaders::ShaderLoader::compiled();
        for name in TECHNIQUES {
            let desc = RenderGraphDesc::by_name(name, DEPTH).unwrap();
            for subpass in 0..desc.subpasses.len() as u32 {
                assert!(
                    shaders.load_subpass(name, subpass).is_ok(),
                    "{name} subpass {subpass} has no shaders"
                );
            }
        }
    }

    #[test]
    fn unknown_preset_rejected() {
        assert!(matches!(
            RenderGraphDesc::by_name("forward_plus", DEPTH),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn depth_multi_pass_shape() {
        let desc = RenderGraphDesc::depth_multi_pass(DEPTH);
        let infos = desc.subpass_infos();

        assert_eq!(desc.attachment_count(), 3);
        assert_eq!(infos[0], SubpassInfo::writes([1, 2]));
        assert_eq!(infos[1], SubpassInfo::new([1, 2], [0]));
        assert_eq!(desc.subpasses[1].resources.len(), 2);
    }

    #[test]
    fn full_screen_uniform_follows_inputs() {
        let desc = RenderGraphDesc::deferred(DEPTH);
        assert_eq!(desc.subpasses[1].frame_uniform_binding(), Some(3));
        assert_eq!(desc.subpasses[0].frame_uniform_binding(), Some(FRAME_UNIFORM_BINDING));
    }

    #[test]
    fn ssao_ao_target_read_by_lighting() {
        let desc = RenderGraphDesc::ssao(DEPTH);
        assert_eq!(desc.subpasses.len(), 3);
        assert_eq!(desc.subpasses[1].info.outputs, vec![4]);
        assert!(desc.subpasses[2].info.inputs.contains(&4));
        assert_eq!(desc.attachments[3].format, vk::Format::R8_UNORM);
    }

    #[test]
    fn clear_color_override() {
        let desc = RenderGraphDesc::single_pass(DEPTH).with_clear_color([0.5, 0.5, 0.5, 1.0]);
        assert_eq!(desc.clear_values[0], ClearValue::Color([0.5, 0.5, 0.5, 1.0]));
        desc.validate().unwrap();
    }

    #[test]
    fn clear_kind_must_match_format() {
        let mut desc = RenderGraphDesc::single_pass(DEPTH);
        desc.clear_values[1] = ClearValue::BLACK;
        assert!(matches!(desc.validate(), Err(RenderError::Config(_))));
    }

    #[test]
    fn full_screen_first_subpass_rejected() {
        let mut desc = RenderGraphDesc::single_pass(DEPTH);
        desc.subpasses[0].draws = SubpassDraws::FullScreen;
        assert!(matches!(desc.validate(), Err(RenderError::Config(_))));
    }

    #[test]
    fn second_scene_subpass_rejected() {
        let mut desc = RenderGraphDesc::depth_multi_pass(DEPTH);
        desc.subpasses[1].draws = SubpassDraws::SceneGeometry;
        assert!(matches!(desc.validate(), Err(RenderError::Config(_))));
    }

    #[test]
    fn missing_input_resource_rejected() {
        let mut desc = RenderGraphDesc::depth_multi_pass(DEPTH);
        desc.subpasses[1].resources.pop();
        assert!(matches!(desc.validate(), Err(RenderError::Config(_))));
    }

    #[test]
    fn graph_errors_propagate() {
        let mut desc = RenderGraphDesc::single_pass(DEPTH);
        desc.subpasses[0].info.outputs = vec![1];
        assert!(matches!(desc.validate(), Err(RenderError::Graph(_))));
    }

    #[test]
    fn depth_clear_converts() {
        let value = ClearValue::FAR.to_vk();
        // SAFETY: written as depth_stencil above.
        let depth = unsafe { value.depth_stencil };
        assert_eq!(depth.depth, 1.0);
        assert_eq!(depth.stencil, 0);
    }
}
