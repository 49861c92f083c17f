/// Keys tmux addresses by token rather than by literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKey {
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
    Delete,
    CtrlC,
    CtrlD,
    CtrlZ,
    CtrlL,
    CtrlA,
    CtrlE,
    CtrlK,
    CtrlU,
    CtrlW,
    CtrlR,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

impl SpecialKey {
    /// The token handed to `send-keys`.
    pub fn token(self) -> &'static str {
        match self {
            SpecialKey::Enter => "Enter",
            SpecialKey::Escape => "Escape",
            SpecialKey::Tab => "Tab",
            SpecialKey::Space => "Space",
            SpecialKey::Backspace => "BSpace",
            SpecialKey::Delete => "DC",
            SpecialKey::CtrlC => "C-c",
            SpecialKey::CtrlD => "C-d",
            SpecialKey::CtrlZ => "C-z",
            SpecialKey::CtrlL => "C-l",
            SpecialKey::CtrlA => "C-a",
            SpecialKey::CtrlE => "C-e",
            SpecialKey::CtrlK => "C-k",
            SpecialKey::CtrlU => "C-u",
            SpecialKey::CtrlW => "C-w",
            SpecialKey::CtrlR => "C-r",
            SpecialKey::Up => "Up",
            SpecialKey::Down => "Down",
            SpecialKey::Left => "Left",
            SpecialKey::Right => "Right",
            SpecialKey::Home => "Home",
            SpecialKey::End => "End",
            SpecialKey::PageUp => "PPage",
            SpecialKey::PageDown => "NPage",
            SpecialKey::F1 => "F1",
            SpecialKey::F2 => "F2",
            SpecialKey::F3 => "F3",
            SpecialKey::F4 => "F4",
            SpecialKey::F5 => "F5",
            SpecialKey::F6 => "F6",
            SpecialKey::F7 => "F7",
            SpecialKey::F8 => "F8",
            SpecialKey::F9 => "F9",
            SpecialKey::F10 => "F10",
            SpecialKey::F11 => "F11",
            SpecialKey::F12 => "F12",
        }
    }

    /// Resolve a key name, case-insensitively, accepting the common alias
    /// spellings (`ENTER`/`RETURN`/`CR`, `ESC`, `CTRL-C`/`C_C`/`CTRLC`, …).
    pub fn resolve(name: &str) -> Option<SpecialKey> {
        let normalized = name.trim().to_ascii_uppercase().replace('-', "_");
        let key = match normalized.as_str() {
            "ENTER" | "RETURN" | "CR" => SpecialKey::Enter,
            "ESC" | "ESCAPE" => SpecialKey::Escape,
            "TAB" => SpecialKey::Tab,
            "SPACE" => SpecialKey::Space,
            "BACKSPACE" | "BS" | "BSPACE" => SpecialKey::Backspace,
            "DELETE" | "DEL" | "DC" => SpecialKey::Delete,
            "CTRL_C" | "C_C" | "CTRLC" => SpecialKey::CtrlC,
            "CTRL_D" | "C_D" | "CTRLD" => SpecialKey::CtrlD,
            "CTRL_Z" | "C_Z" | "CTRLZ" => SpecialKey::CtrlZ,
            "CTRL_L" | "C_L" | "CTRLL" => SpecialKey::CtrlL,
            "CTRL_A" | "C_A" | "CTRLA" => SpecialKey::CtrlA,
            "CTRL_E" | "C_E" | "CTRLE" => SpecialKey::CtrlE,
            "CTRL_K" | "C_K" | "CTRLK" => SpecialKey::CtrlK,
            "CTRL_U" | "C_U" | "CTRLU" => SpecialKey::CtrlU,
            "CTRL_W" | "C_W" | "CTRLW" => SpecialKey::CtrlW,
            "CTRL_R" | "C_R" | "CTRLR" => SpecialKey::CtrlR,
            "UP" => SpecialKey::Up,
            "DOWN" => SpecialKey::Down,
            "LEFT" => SpecialKey::Left,
            "RIGHT" => SpecialKey::Right,
            "HOME" => SpecialKey::Home,
            "END" => SpecialKey::End,
            "PAGE_UP" | "PAGEUP" | "PGUP" | "PPAGE" => SpecialKey::PageUp,
            "PAGE_DOWN" | "PAGEDOWN" | "PGDN" | "NPAGE" => SpecialKey::PageDown,
            "F1" => SpecialKey::F1,
            "F2" => SpecialKey::F2,
            "F3" => SpecialKey::F3,
            "F4" => SpecialKey::F4,
            "F5" => SpecialKey::F5,
            "F6" => SpecialKey::F6,
            "F7" => SpecialKey::F7,
            "F8" => SpecialKey::F8,
            "F9" => SpecialKey::F9,
            "F10" => SpecialKey::F10,
            "F11" => SpecialKey::F11,
            "F12" => SpecialKey::F12,
            _ => return None,
        };
        Some(key)
    }
}
