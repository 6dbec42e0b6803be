//! Display and controls initialization plus button → event binding.

use crate::action::Action;
use crate::behavior::Behavior;
use crate::context::BehaviorContext;
use core_events::{Event, HandlerScope};
use core_state::{ControlButton, DisplayState, MemoryTag, MemoryValue, Visibility};

/// Allocates the `display` entry UIs subscribe to.
pub struct DisplayInit {
    mode: Option<String>,
}

impl DisplayInit {
    pub fn new(mode: Option<String>) -> Self {
        Self { mode }
    }
}

impl Behavior for DisplayInit {
    fn name(&self) -> &'static str {
        "DisplayInit"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        let state = DisplayState {
            label: ctx.label.to_string(),
            mode: self.mode.clone(),
            round_label: None,
        };
        ctx.allocate(
            MemoryTag::Display,
            MemoryValue::Display(state),
            Visibility::Public,
        );
        Ok(Vec::new())
    }
}

/// Allocates the `controls` entry; clears the button list on unmount so a
/// subscribed UI drops its buttons before the entry is released.
pub struct ControlsInit {
    buttons: Vec<ControlButton>,
}

impl ControlsInit {
    pub fn new(buttons: Vec<ControlButton>) -> Self {
        Self { buttons }
    }
}

impl Behavior for ControlsInit {
    fn name(&self) -> &'static str {
        "ControlsInit"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        ctx.allocate(
            MemoryTag::Controls,
            MemoryValue::Controls(self.buttons.clone()),
            Visibility::Public,
        );
        Ok(Vec::new())
    }

    fn on_unmount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        if let Some(id) = ctx.find(&MemoryTag::Controls) {
            ctx.memory.set(id, MemoryValue::Controls(Vec::new()))?;
        }
        Ok(Vec::new())
    }
}

/// Binds each button's click event to the runtime event it emits. Scoped
/// `active`: buttons only work while their block is on top.
pub struct ButtonEvent {
    buttons: Vec<ControlButton>,
}

impl ButtonEvent {
    pub fn new(buttons: Vec<ControlButton>) -> Self {
        Self { buttons }
    }
}

impl Behavior for ButtonEvent {
    fn name(&self) -> &'static str {
        "ButtonEvent"
    }

    fn on_mount(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<Vec<Action>> {
        for button in &self.buttons {
            let emits = button.emits.clone();
            ctx.register_handler(&button.event, HandlerScope::Active, move |_, args| {
                vec![Action::Dispatch(Event::new(&emits, args.now))]
            });
        }
        Ok(Vec::new())
    }
}
