// Keyboard bindings from the [controls] config section

use winit::keyboard::KeyCode;

use crate::config::ControlsConfig;

/// What a key press means to the app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Jump,
    ToggleFullscreen,
    Quit,
}

#[derive(Debug, Clone)]
pub struct KeyBindings {
    jump: KeyCode,
    fullscreen: KeyCode,
    quit: KeyCode,
}

impl KeyBindings {
    pub fn from_config(controls: &ControlsConfig) -> Self {
        Self {
            jump: controls.jump_key,
            fullscreen: controls.fullscreen_key,
            quit: controls.quit_key,
        }
    }

    pub fn action_for(&self, key: KeyCode) -> Option<Action> {
        if key == self.jump {
            Some(Action::Jump)
        } else if key == self.fullscreen {
            Some(Action::ToggleFullscreen)
        } else if key == self.quit {
            Some(Action::Quit)
        } else {
            None
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::from_config(&ControlsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_bindings() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.action_for(KeyCode::Space), Some(Action::Jump));
        assert_eq!(bindings.action_for(KeyCode::F11), Some(Action::ToggleFullscreen));
        assert_eq!(bindings.action_for(KeyCode::Escape), Some(Action::Quit));
        assert_eq!(bindings.action_for(KeyCode::KeyZ), None);
    }

    #[test]
    fn test_rebound_keys() {
        let controls = ControlsConfig {
            jump_key: KeyCode::KeyE,
            fullscreen_key: KeyCode::Digit5,
            quit_key: KeyCode::ShiftLeft,
        };
        let bindings = KeyBindings::from_config(&controls);
        assert_eq!(bindings.action_for(KeyCode::KeyE), Some(Action::Jump));
        assert_eq!(bindings.action_for(KeyCode::Digit5), Some(Action::ToggleFullscreen));
        assert_eq!(bindings.action_for(KeyCode::ShiftLeft), Some(Action::Quit));
        assert_eq!(bindings.action_for(KeyCode::Space), None);
    }
}
