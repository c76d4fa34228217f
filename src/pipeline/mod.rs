//! Builders for the immutable pipeline objects.
//!
//! Every builder takes a fully specified description, creates exactly one
//! native object, and registers it. Nothing here is mutated after creation,
//! changing a parameter means building a new object and destroying the old
//! one.

mod graphics;
mod layout;
mod render_pass;
mod shader;

pub use self::{
    graphics::{create_graphics_pipeline, GraphicsPipelineDesc, ShaderStage},
    layout::{
        create_descriptor_set_layout, create_pipeline_layout,
        DescriptorBinding,
    },
    render_pass::{create_framebuffer, create_render_pass, RenderPassDesc},
    shader::{create_shader_module, spirv_words},
};
