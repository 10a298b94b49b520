//! Pointer-drag state machine and the alternate keyboard/wheel channels.
//!
//! A drag moves the engine from `Idle` into `Dragging(tool)` and stays there
//! for every move until the pointer is released or leaves the surface. Each
//! move is turned into a [`ToolEffect`] by an exhaustive match over [`Tool`].

use crate::{
    config::InteractionConfig,
    enums::{Key, Tool},
    playback::PlaybackController,
    viewport::{ViewState, ViewportPatch, WindowLevelPatch},
};

use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    PointerLeave,
    Wheel { delta_y: f32 },
    Key(Key),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        tool: Tool,
        last: (f32, f32),
        /// Vertical distance not yet converted into whole frames.
        scroll_residual: f32,
    },
}

/// What a single pointer move asks the viewer to change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToolEffect {
    None,
    Viewport(ViewportPatch),
    WindowLevel(WindowLevelPatch),
    Navigate(isize),
}

/// Navigation requested through the keyboard or the wheel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationAction {
    Step(isize),
    First,
    Last,
    TogglePlayback,
}

impl NavigationAction {
    pub fn from_key(key: Key) -> Self {
        match key {
            Key::ArrowDown | Key::ArrowRight => NavigationAction::Step(1),
            Key::ArrowUp | Key::ArrowLeft => NavigationAction::Step(-1),
            Key::Home => NavigationAction::First,
            Key::End => NavigationAction::Last,
            Key::Space => NavigationAction::TogglePlayback,
        }
    }

    /// One frame per wheel event, in the direction of the scroll.
    pub fn from_wheel(delta_y: f32) -> Option<Self> {
        if delta_y > 0.0 {
            Some(NavigationAction::Step(1))
        } else if delta_y < 0.0 {
            Some(NavigationAction::Step(-1))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct InteractionEngine {
    active_tool: Tool,
    drag: DragState,
    sensitivity: InteractionConfig,
}

impl InteractionEngine {
    pub fn new(sensitivity: InteractionConfig, active_tool: Tool) -> Self {
        Self {
            active_tool,
            drag: DragState::Idle,
            sensitivity,
        }
    }

    pub fn active_tool(&self) -> Tool {
        self.active_tool
    }

    /// Takes effect on the next drag; a drag in progress keeps its tool.
    pub fn set_active_tool(&mut self, tool: Tool) {
        self.active_tool = tool;
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    /// Begin a drag with the active tool. Playback is stopped before anything
    /// else happens.
    pub fn pointer_down(&mut self, x: f32, y: f32, playback: &mut PlaybackController) {
        playback.stop();
        self.drag = DragState::Dragging {
            tool: self.active_tool,
            last: (x, y),
            scroll_residual: 0.0,
        };
    }

    /// Turn the delta since the last sampled position into a tool effect.
    /// Outside a drag this is a no-op.
    pub fn pointer_move(&mut self, x: f32, y: f32, view: &ViewState) -> ToolEffect {
        let DragState::Dragging {
            tool,
            last,
            scroll_residual,
        } = self.drag
        else {
            return ToolEffect::None;
        };
        let (dx, dy) = (x - last.0, y - last.1);

        let (effect, scroll_residual) = self.effect(tool, dx, dy, view, scroll_residual);
        self.drag = DragState::Dragging {
            tool,
            last: (x, y),
            scroll_residual,
        };
        trace!(?tool, dx, dy, ?effect, "Drag sample");
        effect
    }

    pub fn pointer_up(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn pointer_leave(&mut self) {
        self.drag = DragState::Idle;
    }

    fn effect(
        &self,
        tool: Tool,
        dx: f32,
        dy: f32,
        view: &ViewState,
        scroll_residual: f32,
    ) -> (ToolEffect, f32) {
        let viewport = view.viewport();
        let window = view.window_level();
        let s = &self.sensitivity;

        let effect = match tool {
            Tool::Pan => {
                let (tx, ty) = viewport.translation;
                ToolEffect::Viewport(ViewportPatch::default().translation(tx + dx, ty + dy))
            }
            Tool::Zoom => ToolEffect::Viewport(
                ViewportPatch::default().scale(viewport.scale * (1.0 + dy * s.zoom_sensitivity)),
            ),
            Tool::WindowLevel => ToolEffect::WindowLevel(
                WindowLevelPatch::default()
                    .width(window.width + dx * s.window_sensitivity)
                    .center(window.center + dy * s.window_sensitivity),
            ),
            Tool::Rotate => ToolEffect::Viewport(
                ViewportPatch::default().rotation(viewport.rotation + dx * s.rotate_sensitivity),
            ),
            Tool::StackScroll => {
                let travelled = scroll_residual + dy;
                let frames = (travelled / s.scroll_step_px).trunc();
                let residual = travelled - frames * s.scroll_step_px;
                let effect = if frames == 0.0 {
                    ToolEffect::None
                } else {
                    ToolEffect::Navigate(frames as isize)
                };
                return (effect, residual);
            }
        };
        (effect, scroll_residual)
    }
}
