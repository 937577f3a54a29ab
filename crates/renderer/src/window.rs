use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, error, info, warn};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, ModifiersState, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::fractal::FractalRenderer;
use crate::graphics::GraphicsContext;
use crate::interaction;
use crate::types::{Configuration, FractalSource, Point, PreviewConfig};

/// Opens the interactive preview window and runs until it is closed.
///
/// Controls: left click recenters, the wheel zooms, Tab / Shift+Tab cycle
/// fractals, `P` loads the fractal's preset parameters, `+` / `-` double or
/// halve the iteration count, `R` resets the view and Escape quits.
pub fn run_preview(config: PreviewConfig) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let (width, height) = config.surface_size;
    let window = WindowBuilder::new()
        .with_title("fractalis")
        .with_inner_size(PhysicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let size = window.inner_size();
    let graphics = GraphicsContext::for_window(
        window.clone(),
        (size.width, size.height),
        config.configuration,
        config.palette,
    )?;
    let mut state = PreviewState::new(
        window,
        graphics,
        &config.fractals,
        config.initial_fractal.as_deref(),
    )?;
    state.refresh_title();
    state.window.request_redraw();

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == state.window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                WindowEvent::Resized(new_size) => {
                    state.graphics.set_canvas_size(new_size.width, Some(new_size.height));
                    state.window.request_redraw();
                }
                WindowEvent::ModifiersChanged(modifiers) => state.modifiers = modifiers.state(),
                WindowEvent::CursorMoved { position, .. } => state.cursor = Some(position),
                WindowEvent::MouseInput {
                    state: ElementState::Pressed,
                    button: MouseButton::Left,
                    ..
                } => state.recenter(),
                WindowEvent::MouseWheel { delta, .. } => state.zoom(interaction::wheel_delta(delta)),
                WindowEvent::KeyboardInput { event, .. } => {
                    if state.handle_key(&event) == KeyOutcome::Quit {
                        elwt.exit();
                    }
                }
                WindowEvent::RedrawRequested => {
                    let renderer = &state.renderers[state.selected];
                    let result = state.graphics.draw(renderer);
                    match frame_outcome(&result) {
                        FrameOutcome::Redraw => state.window.request_redraw(),
                        FrameOutcome::Exit => elwt.exit(),
                    }
                }
                _ => {}
            },
            Event::AboutToWait => elwt.set_control_flow(ControlFlow::Wait),
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Redraw,
    Exit,
}

/// The loop schedules the next frame after every draw; only an
/// out-of-memory surface ends it.
fn frame_outcome(result: &Result<(), wgpu::SurfaceError>) -> FrameOutcome {
    match result {
        Ok(()) => FrameOutcome::Redraw,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            debug!("surface reconfigured; redrawing");
            FrameOutcome::Redraw
        }
        Err(wgpu::SurfaceError::OutOfMemory) => {
            error!("surface out of memory; exiting preview");
            FrameOutcome::Exit
        }
        Err(wgpu::SurfaceError::Timeout) => {
            warn!("surface timeout; retrying next frame");
            FrameOutcome::Redraw
        }
        Err(other) => {
            warn!("surface error: {other:?}; retrying next frame");
            FrameOutcome::Redraw
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOutcome {
    Handled,
    Ignored,
    Quit,
}

struct PreviewState {
    window: Arc<Window>,
    graphics: GraphicsContext,
    renderers: Vec<FractalRenderer>,
    selected: usize,
    cursor: Option<PhysicalPosition<f64>>,
    modifiers: ModifiersState,
}

impl PreviewState {
    fn new(
        window: Arc<Window>,
        graphics: GraphicsContext,
        fractals: &[FractalSource],
        initial: Option<&str>,
    ) -> Result<Self> {
        let mut renderers = Vec::with_capacity(fractals.len());
        for source in fractals {
            match graphics.build_renderer(source) {
                Ok(renderer) => renderers.push(renderer),
                Err(err) => error!(fractal = %source.key, "fractal unavailable: {err}"),
            }
        }
        if renderers.is_empty() {
            anyhow::bail!("none of the {} fractals could be built", fractals.len());
        }

        let selected = match initial {
            Some(key) => renderers
                .iter()
                .position(|renderer| renderer.key() == key)
                .unwrap_or_else(|| {
                    warn!(fractal = key, "requested fractal is unavailable; showing the first one");
                    0
                }),
            None => 0,
        };
        info!(
            fractals = renderers.len(),
            selected = renderers[selected].key(),
            "preview ready"
        );

        Ok(Self {
            window,
            graphics,
            renderers,
            selected,
            cursor: None,
            modifiers: ModifiersState::empty(),
        })
    }

    fn recenter(&mut self) {
        let Some(position) = self.cursor else {
            return;
        };
        let size = self.graphics.canvas_size();
        let offset = interaction::offset_from_center(Point::new(position.x, position.y), size);
        interaction::apply_recenter(self.graphics.config_mut(), offset, size);
        self.changed();
    }

    fn zoom(&mut self, delta: f64) {
        if interaction::apply_zoom(self.graphics.config_mut(), delta) {
            self.changed();
        }
    }

    fn handle_key(&mut self, event: &KeyEvent) -> KeyOutcome {
        if event.state != ElementState::Pressed {
            return KeyOutcome::Ignored;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => return KeyOutcome::Quit,
            Key::Named(NamedKey::Tab) => {
                let step = if self.modifiers.shift_key() {
                    self.renderers.len() - 1
                } else {
                    1
                };
                self.selected = (self.selected + step) % self.renderers.len();
                info!(fractal = self.renderers[self.selected].key(), "switched fractal");
            }
            Key::Character(text) => match text.as_str() {
                "p" | "P" => {
                    let (c, p) = self.renderers[self.selected].preset();
                    self.graphics.config_mut().load_preset(c, p);
                }
                "r" | "R" => self.graphics.config_mut().reset_view(),
                "+" | "=" => self.scale_iterations(true),
                "-" | "_" => self.scale_iterations(false),
                _ => return KeyOutcome::Ignored,
            },
            _ => return KeyOutcome::Ignored,
        }
        self.changed();
        KeyOutcome::Handled
    }

    fn scale_iterations(&mut self, up: bool) {
        let mut config = *self.graphics.config();
        config.iterations = if up {
            config.iterations.saturating_mul(2).min(self.graphics.max_iterations())
        } else {
            (config.iterations / 2).max(1)
        };
        match self.graphics.set_config(config) {
            Ok(()) => info!(iterations = config.iterations, "iteration count changed"),
            Err(err) => warn!(error = %err, "iteration count rejected"),
        }
    }

    fn changed(&mut self) {
        self.refresh_title();
        self.window.request_redraw();
    }

    fn refresh_title(&self) {
        let renderer = &self.renderers[self.selected];
        self.window
            .set_title(&window_title(renderer.name(), self.graphics.config()));
    }
}

fn window_title(name: &str, config: &Configuration) -> String {
    format!(
        "{name} | center {} | axis {} | {} iterations | c {} | p {}",
        config.center, config.axis_length, config.iterations, config.c, config.p
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_lists_view_and_parameters() {
        let config = Configuration {
            c: Point::new(-1.0, 0.0),
            ..Configuration::default()
        };
        assert_eq!(
            window_title("Julia", &config),
            "Julia | center (0, 0) | axis 4 | 256 iterations | c (-1, 0) | p (0, 0)"
        );
    }

    #[test]
    fn every_frame_schedules_the_next_one() {
        assert_eq!(frame_outcome(&Ok(())), FrameOutcome::Redraw);
        assert_eq!(
            frame_outcome(&Err(wgpu::SurfaceError::Outdated)),
            FrameOutcome::Redraw
        );
        assert_eq!(
            frame_outcome(&Err(wgpu::SurfaceError::Timeout)),
            FrameOutcome::Redraw
        );
        assert_eq!(
            frame_outcome(&Err(wgpu::SurfaceError::OutOfMemory)),
            FrameOutcome::Exit
        );
    }
}
