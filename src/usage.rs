//! HID usage table values used by this crate and its callers.

pub mod page {
    /// Matches any page when used as a filter.
    pub const UNDEFINED: u32 = 0x00;
    pub const GENERIC_DESKTOP: u32 = 0x01;
    pub const KEYBOARD_OR_KEYPAD: u32 = 0x07;
    pub const LEDS: u32 = 0x08;
    pub const BUTTON: u32 = 0x09;
    pub const CONSUMER: u32 = 0x0c;
}

pub mod generic_desktop {
    pub const POINTER: u32 = 0x01;
    pub const MOUSE: u32 = 0x02;
    pub const JOYSTICK: u32 = 0x04;
    pub const GAME_PAD: u32 = 0x05;
    pub const KEYBOARD: u32 = 0x06;
    pub const KEYPAD: u32 = 0x07;
}

pub mod led {
    pub const NUM_LOCK: u32 = 0x01;
    pub const CAPS_LOCK: u32 = 0x02;
    pub const SCROLL_LOCK: u32 = 0x03;
    pub const COMPOSE: u32 = 0x04;
    pub const KANA: u32 = 0x05;
}
