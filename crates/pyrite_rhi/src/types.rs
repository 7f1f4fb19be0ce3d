//! Value types crossing the render-hardware-interface boundary.

use std::sync::atomic::{AtomicU64, Ordering};

/// The GPU-visible state of a resource, as tracked by the render graph's
/// barrier placement pass (§4.7). `Undefined` means "no known prior state"
/// — the initial state of a purely transient resource, or recorded for an
/// imported resource whose caller didn't supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Undefined,
    RenderTarget,
    DepthStencilWrite,
    ShaderResource,
    CopySrc,
    CopyDst,
    Present,
}

/// A texture pixel format. Only the handful the render graph and shadow
/// passes actually need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Depth32Float,
    Bgra8UnormSrgb,
}

bitflags::bitflags! {
    /// How a texture may be bound, mirroring the intersection of usages
    /// `wgpu`-style backends expose.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u8 {
        const RENDER_TARGET    = 1 << 0;
        const DEPTH_STENCIL    = 1 << 1;
        const SHADER_RESOURCE  = 1 << 2;
        const COPY_SRC         = 1 << 3;
        const COPY_DST         = 1 << 4;
    }
}

/// Fully describes a texture the render graph can request, independent of
/// any particular backing allocation. Hashed by the transient pool to find
/// a reusable match (§4.8).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub depth_or_array_layers: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// A single-layer, single-mip, non-multisampled 2D texture — the
    /// common case for render targets and shadow maps.
    #[must_use]
    pub fn simple_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        TextureDesc {
            width,
            height,
            depth_or_array_layers: 1,
            mip_levels: 1,
            sample_count: 1,
            format,
            usage,
        }
    }
}

/// Generates the small monotonically-increasing handle values used by
/// [`TextureHandle`], [`BufferHandle`], and [`CommandHandle`]. Handle `0`
/// is never issued, since the render graph reserves it as invalid (§3).
fn next_handle_value(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

macro_rules! opaque_handle {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// The reserved "no resource" value.
            pub const INVALID: $name = $name(0);

            #[must_use]
            pub fn is_valid(self) -> bool {
                self.0 != 0
            }
        }
    };
}

opaque_handle!(TextureHandle, "An opaque backend-assigned texture handle.");
opaque_handle!(BufferHandle, "An opaque backend-assigned GPU buffer handle.");
opaque_handle!(CommandHandle, "An opaque handle for an in-flight command recording.");

/// Allocates the next nonzero handle value for a backend implementation.
/// Exposed so [`crate::null_backend::NullBackend`] and any real backend can
/// share the same "never issue 0" invariant without duplicating an atomic.
pub fn allocate_handle(counter: &AtomicU64) -> u64 {
    next_handle_value(counter)
}
