use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::SceneOptions;
use crate::scene::{Canvas, RenderResult, Scene};

/// Base particle speed in px/s before `speed-factor` is applied.
const BASE_SPEED: f32 = 50.0;
/// Upper bound on the simulated step so a long pause does not teleport particles.
const MAX_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
struct Particle {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    radius: f32,
}

/// Drifting dots linked by lines when they come close to each other.
pub struct ParticleScene {
    options: SceneOptions,
    rng: StdRng,
    particles: Vec<Particle>,
    bounds: (u32, u32),
    frame_delay: Duration,
    translation_x: f32,
    background_color: u32,
    background: Option<Arc<RgbaImage>>,
    last_frame: Option<Instant>,
}

impl ParticleScene {
    pub fn new(options: SceneOptions) -> Self {
        Self::with_rng(options, StdRng::from_os_rng())
    }

    pub fn with_seed(options: SceneOptions, seed: u64) -> Self {
        Self::with_rng(options, StdRng::seed_from_u64(seed))
    }

    fn with_rng(options: SceneOptions, rng: StdRng) -> Self {
        Self {
            options,
            rng,
            particles: Vec::new(),
            bounds: (0, 0),
            frame_delay: Duration::ZERO,
            translation_x: 0.0,
            background_color: 0xFF00_0000,
            background: None,
            last_frame: None,
        }
    }

    pub fn bounds(&self) -> (u32, u32) {
        self.bounds
    }

    pub fn frame_delay(&self) -> Duration {
        self.frame_delay
    }

    pub fn translation_x(&self) -> f32 {
        self.translation_x
    }

    pub fn background_color(&self) -> u32 {
        self.background_color
    }

    pub fn has_background_image(&self) -> bool {
        self.background.is_some()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    fn spawn_particle(&mut self) -> Particle {
        let (w, h) = (self.bounds.0 as f32, self.bounds.1 as f32);
        let [min_r, max_r] = self.options.dot_radius_range;
        let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
        let speed = BASE_SPEED * self.options.speed_factor * self.rng.random_range(0.5..=1.0);
        Particle {
            x: self.rng.random_range(0.0..w),
            y: self.rng.random_range(0.0..h),
            vx: angle.cos() * speed,
            vy: angle.sin() * speed,
            radius: if max_r > min_r {
                self.rng.random_range(min_r..=max_r)
            } else {
                min_r
            },
        }
    }

    fn ensure_particles(&mut self) {
        if self.bounds.0 == 0 || self.bounds.1 == 0 {
            return;
        }
        while self.particles.len() < self.options.density {
            let particle = self.spawn_particle();
            self.particles.push(particle);
        }
        self.particles.truncate(self.options.density);
    }

    /// Moves every particle by `dt`, wrapping around the scene bounds.
    pub fn advance(&mut self, dt: Duration) {
        let dt = dt.min(MAX_STEP).as_secs_f32();
        let (w, h) = (self.bounds.0 as f32, self.bounds.1 as f32);
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        for p in &mut self.particles {
            p.x = wrap(p.x + p.vx * dt, w);
            p.y = wrap(p.y + p.vy * dt, h);
        }
    }

    fn render(&self, canvas: &mut Canvas) {
        canvas.clear(self.background_color);
        if let Some(image) = self.background.as_ref() {
            canvas.draw_image(image, self.translation_x.round(), 0.0);
        }

        let color = self.options.particle_color;
        let base_alpha = (color >> 24) as f32;
        let rgb = color & 0x00FF_FFFF;
        let max_dist = self.options.line_distance;
        let tx = self.translation_x;

        if max_dist > 0.0 && self.options.line_thickness > 0.0 {
            for (i, a) in self.particles.iter().enumerate() {
                for b in &self.particles[i + 1..] {
                    let dist = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                    if dist >= max_dist {
                        continue;
                    }
                    let alpha = (base_alpha * (1.0 - dist / max_dist)) as u32;
                    canvas.draw_line(
                        (a.x + tx, a.y),
                        (b.x + tx, b.y),
                        self.options.line_thickness,
                        (alpha << 24) | rgb,
                    );
                }
            }
        }

        for p in &self.particles {
            canvas.fill_circle(p.x + tx, p.y, p.radius, color);
        }
    }
}

fn wrap(value: f32, extent: f32) -> f32 {
    let wrapped = value.rem_euclid(extent);
    // rem_euclid may round up to `extent` for tiny negative inputs
    if wrapped >= extent { 0.0 } else { wrapped }
}

impl Scene for ParticleScene {
    fn draw(&mut self, canvas: &mut Canvas) -> RenderResult {
        let now = Instant::now();
        self.ensure_particles();
        if let Some(last) = self.last_frame.replace(now) {
            self.advance(now.duration_since(last));
        }
        self.render(canvas);
        RenderResult::NextFrameIn(self.frame_delay)
    }

    fn set_bounds(&mut self, width: u32, height: u32) {
        if self.bounds == (width, height) {
            return;
        }
        debug!(width, height, "scene bounds changed");
        self.bounds = (width, height);
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        for p in &mut self.particles {
            p.x = wrap(p.x, w);
            p.y = wrap(p.y, h);
        }
    }

    fn set_frame_delay(&mut self, delay: Duration) {
        self.frame_delay = delay;
    }

    fn translate_x(&mut self, dx: f32) {
        self.translation_x = dx;
    }

    fn set_background_color(&mut self, argb: u32) {
        self.background_color = argb;
    }

    fn set_background_image(&mut self, image: Option<Arc<RgbaImage>>) {
        self.background = image;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(density: usize) -> SceneOptions {
        SceneOptions {
            density,
            ..SceneOptions::default()
        }
    }

    #[test]
    fn draw_without_bounds_only_clears_background() {
        let mut scene = ParticleScene::with_seed(options(10), 7);
        scene.set_background_color(0xFF11_2233);
        scene.set_frame_delay(Duration::from_millis(16));
        let mut canvas = Canvas::new(4, 4);

        let result = scene.draw(&mut canvas);
        assert_eq!(result, RenderResult::NextFrameIn(Duration::from_millis(16)));
        assert_eq!(scene.particle_count(), 0);
        assert_eq!(canvas.clear_color(), 0xFF11_2233);
        assert!(canvas.vertices().is_empty());
    }

    #[test]
    fn particles_stay_inside_bounds() {
        let mut scene = ParticleScene::with_seed(options(25), 3);
        scene.set_bounds(64, 32);
        let mut canvas = Canvas::new(64, 32);
        scene.draw(&mut canvas);
        assert_eq!(scene.particle_count(), 25);
        assert!(!canvas.indices().is_empty());

        for _ in 0..50 {
            scene.advance(Duration::from_millis(80));
        }
        for p in &scene.particles {
            assert!((0.0..64.0).contains(&p.x), "x out of bounds: {}", p.x);
            assert!((0.0..32.0).contains(&p.y), "y out of bounds: {}", p.y);
        }

        scene.set_bounds(16, 16);
        for p in &scene.particles {
            assert!(p.x < 16.0 && p.y < 16.0);
        }
    }

    #[test]
    fn links_fade_with_distance() {
        let mut scene = ParticleScene::with_seed(
            SceneOptions {
                density: 0,
                dot_radius_range: [1.0, 1.0],
                line_distance: 100.0,
                particle_color: 0xFFFF_FFFF,
                ..SceneOptions::default()
            },
            5,
        );
        scene.set_bounds(200, 200);
        scene.particles = vec![
            Particle { x: 10.0, y: 10.0, vx: 0.0, vy: 0.0, radius: 1.0 },
            Particle { x: 60.0, y: 10.0, vx: 0.0, vy: 0.0, radius: 1.0 },
            Particle { x: 190.0, y: 190.0, vx: 0.0, vy: 0.0, radius: 1.0 },
        ];
        let mut canvas = Canvas::new(200, 200);
        scene.render(&mut canvas);

        let alphas: Vec<f32> = canvas
            .vertices()
            .iter()
            .map(|v| v.color[3])
            .filter(|a| *a < 1.0)
            .collect();
        assert!(!alphas.is_empty(), "expected one half-faded link");
        for a in alphas {
            assert!((a - 127.0 / 255.0).abs() < 1e-6, "unexpected link alpha {a}");
        }
    }

    #[test]
    fn background_image_follows_translation() {
        let mut scene = ParticleScene::with_seed(options(0), 1);
        scene.set_bounds(8, 2);
        scene.set_background_image(Some(Arc::new(RgbaImage::new(8, 2))));
        scene.translate_x(-4.0);

        let mut canvas = Canvas::new(4, 2);
        scene.draw(&mut canvas);
        let layer = canvas.background().expect("background drawn");
        assert_eq!((layer.x, layer.y), (-4.0, 0.0));
        assert_eq!(scene.translation_x(), -4.0);

        scene.set_background_image(None);
        assert!(!scene.has_background_image());
        scene.draw(&mut canvas);
        assert!(canvas.background().is_none());
    }
}
