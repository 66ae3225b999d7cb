use std::sync::Arc;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use lyon::math::point;
use lyon::path::Path;
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillTessellator, FillVertex, LineCap, StrokeOptions,
    StrokeTessellator, StrokeVertex, VertexBuffers,
};
use tracing::debug;

/// Flattening tolerance for circles and links, in px.
const TOLERANCE: f32 = 0.1;

/// What a scene wants after drawing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderResult {
    Idle,
    NextFrameIn(Duration),
}

/// Renderable state drawn once per frame.
///
/// Every method is called on the drawing context only.
pub trait Scene {
    fn draw(&mut self, canvas: &mut Canvas) -> RenderResult;
    /// Size of the scene in pixels; may exceed the surface to leave scroll room.
    fn set_bounds(&mut self, width: u32, height: u32);
    fn set_frame_delay(&mut self, delay: Duration);
    /// Sets the horizontal translation (absolute, usually negative) applied when drawing.
    fn translate_x(&mut self, dx: f32);
    fn set_background_color(&mut self, argb: u32);
    fn set_background_image(&mut self, image: Option<Arc<RgbaImage>>);
}

/// Converts a packed ARGB value into RGBA bytes.
pub fn argb_to_rgba(argb: u32) -> [u8; 4] {
    let [a, r, g, b] = argb.to_be_bytes();
    [r, g, b, a]
}

/// Converts a packed ARGB value into sRGB-encoded RGBA floats.
pub fn argb_to_rgba_f32(argb: u32) -> [f32; 4] {
    argb_to_rgba(argb).map(|c| f32::from(c) / 255.0)
}

/// Mesh vertex in surface pixel coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    /// sRGB-encoded, straight alpha.
    pub color: [f32; 4],
}

/// Background image placed with its top-left corner at (`x`, `y`).
#[derive(Debug, Clone)]
pub struct BackgroundLayer {
    pub image: Arc<RgbaImage>,
    pub x: f32,
    pub y: f32,
}

/// One frame's worth of drawing: a clear color, an optional background image
/// and a tessellated triangle mesh. The presenter turns it into GPU work.
pub struct Canvas {
    width: u32,
    height: u32,
    clear: u32,
    background: Option<BackgroundLayer>,
    mesh: VertexBuffers<Vertex, u32>,
    fill: FillTessellator,
    stroke: StrokeTessellator,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            clear: 0xFF00_0000,
            background: None,
            mesh: VertexBuffers::new(),
            fill: FillTessellator::new(),
            stroke: StrokeTessellator::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sets the drawable size; contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.background = None;
        self.clear_mesh();
    }

    /// Starts a new frame filled with `argb`.
    pub fn clear(&mut self, argb: u32) {
        self.clear = argb;
        self.background = None;
        self.clear_mesh();
    }

    pub fn clear_color(&self) -> u32 {
        self.clear
    }

    pub fn draw_image(&mut self, image: &Arc<RgbaImage>, x: f32, y: f32) {
        self.background = Some(BackgroundLayer {
            image: image.clone(),
            x,
            y,
        });
    }

    pub fn background(&self) -> Option<&BackgroundLayer> {
        self.background.as_ref()
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, argb: u32) {
        if radius <= 0.0 {
            return;
        }
        let color = argb_to_rgba_f32(argb);
        let result = self.fill.tessellate_circle(
            point(cx, cy),
            radius,
            &FillOptions::tolerance(TOLERANCE),
            &mut BuffersBuilder::new(&mut self.mesh, move |v: FillVertex| Vertex {
                position: v.position().to_array(),
                color,
            }),
        );
        if let Err(err) = result {
            debug!(?err, "circle tessellation failed");
        }
    }

    pub fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), thickness: f32, argb: u32) {
        if thickness <= 0.0 {
            return;
        }
        let mut builder = Path::builder();
        builder.begin(point(from.0, from.1));
        builder.line_to(point(to.0, to.1));
        builder.end(false);
        let path = builder.build();

        let color = argb_to_rgba_f32(argb);
        let options = StrokeOptions::tolerance(TOLERANCE)
            .with_line_width(thickness)
            .with_line_cap(LineCap::Butt);
        let result = self.stroke.tessellate_path(
            &path,
            &options,
            &mut BuffersBuilder::new(&mut self.mesh, move |v: StrokeVertex| Vertex {
                position: v.position().to_array(),
                color,
            }),
        );
        if let Err(err) = result {
            debug!(?err, "line tessellation failed");
        }
    }

    fn clear_mesh(&mut self) {
        self.mesh.vertices.clear();
        self.mesh.indices.clear();
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.mesh.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.mesh.indices
    }
}
