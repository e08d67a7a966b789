//! Hardware facade
//!
//! The agent and the programs it runs only talk to the brick through the
//! [`Hal`] trait. The agent uses a small part of it at fixed points of the
//! session lifecycle (clear the display before a run, reset after a run,
//! read keys while a run is active, play tones on registration and
//! disconnect). Programs reach the rest through the sandboxed `brick` module.
//!
//! [`SimulatedHal`] keeps everything in memory. It backs the agent on hosts
//! without brick hardware and is what tests drive.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors parsing hardware names coming from programs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HalError {
    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("unknown LED color: {0}")]
    UnknownColor(String),

    #[error("unknown motor port: {0}")]
    UnknownMotorPort(String),

    #[error("unknown sensor port: {0}")]
    UnknownSensorPort(String),
}

/// Brick buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Back,
    /// Matches whenever any button is held
    Any,
}

impl FromStr for Key {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Key::Up),
            "down" => Ok(Key::Down),
            "left" => Ok(Key::Left),
            "right" => Ok(Key::Right),
            "enter" => Ok(Key::Enter),
            "back" | "escape" => Ok(Key::Back),
            "any" => Ok(Key::Any),
            _ => Err(HalError::UnknownKey(s.to_string())),
        }
    }
}

/// Preset system sounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    Click,
    DoubleBeep,
    /// Played when the server acknowledges the brick
    Ascending,
    /// Played when a registered session ends
    Descending,
    Buzz,
}

impl Sound {
    pub fn preset_id(self) -> u8 {
        match self {
            Sound::Click => 0,
            Sound::DoubleBeep => 1,
            Sound::Ascending => 2,
            Sound::Descending => 3,
            Sound::Buzz => 4,
        }
    }

    pub fn from_preset_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Sound::Click),
            1 => Some(Sound::DoubleBeep),
            2 => Some(Sound::Ascending),
            3 => Some(Sound::Descending),
            4 => Some(Sound::Buzz),
            _ => None,
        }
    }
}

/// Status LED colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Green,
    Red,
    Orange,
    Black,
}

impl FromStr for LedColor {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "green" => Ok(LedColor::Green),
            "red" => Ok(LedColor::Red),
            "orange" => Ok(LedColor::Orange),
            "black" => Ok(LedColor::Black),
            _ => Err(HalError::UnknownColor(s.to_string())),
        }
    }
}

/// Output port (`A` to `D`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotorPort(char);

impl MotorPort {
    pub fn name(self) -> char {
        self.0
    }
}

impl FromStr for MotorPort {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            port @ ("A" | "B" | "C" | "D") => Ok(MotorPort(port.as_bytes()[0] as char)),
            _ => Err(HalError::UnknownMotorPort(s.to_string())),
        }
    }
}

/// Input port (`1` to `4`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorPort(u8);

impl SensorPort {
    pub fn number(self) -> u8 {
        self.0
    }
}

impl FromStr for SensorPort {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(SensorPort(1)),
            "2" => Ok(SensorPort(2)),
            "3" => Ok(SensorPort(3)),
            "4" => Ok(SensorPort(4)),
            _ => Err(HalError::UnknownSensorPort(s.to_string())),
        }
    }
}

/// Capability set of the brick
///
/// Implementations are shared between the poll loop, the abort monitor and
/// the running program, so they must be `Send + Sync`. The agent never calls
/// into the facade from two places at once except for key reads.
pub trait Hal: Send + Sync {
    fn clear_display(&self);

    fn draw_text(&self, text: &str, x: i32, y: i32);

    fn stop_all_motors(&self);

    fn reset_led(&self);

    fn led_on(&self, color: LedColor);

    fn is_key_pressed(&self, key: Key) -> bool;

    fn play_file(&self, sound: Sound);

    fn play_tone(&self, frequency: u32, duration: Duration);

    fn battery_voltage(&self) -> f64;

    /// Runs a motor at `speed_pct` percent of its maximum speed (-100..=100)
    fn set_motor_speed(&self, port: MotorPort, speed_pct: f64);

    fn stop_motor(&self, port: MotorPort);

    /// Tacho count in degrees
    fn motor_position(&self, port: MotorPort) -> i64;

    fn sensor_value(&self, port: SensorPort) -> f64;

    /// Puts the brick back into its idle state after a program
    fn reset_state(&self) {
        self.clear_display();
        self.stop_all_motors();
        self.reset_led();
    }
}

#[derive(Default)]
struct SimState {
    display: Vec<(String, i32, i32)>,
    led: Option<LedColor>,
    pressed: HashSet<Key>,
    sounds: Vec<Sound>,
    tones: Vec<(u32, Duration)>,
    motors: HashMap<MotorPort, f64>,
    positions: HashMap<MotorPort, i64>,
    sensors: HashMap<SensorPort, f64>,
    resets: usize,
}

/// In-memory brick
pub struct SimulatedHal {
    battery_volts: f64,
    state: Mutex<SimState>,
}

impl SimulatedHal {
    pub fn new() -> Self {
        Self {
            battery_volts: 7.5,
            state: Mutex::new(SimState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Holds a button down until [`release`](Self::release) is called
    pub fn press(&self, key: Key) {
        self.lock().pressed.insert(key);
    }

    pub fn release(&self, key: Key) {
        self.lock().pressed.remove(&key);
    }

    pub fn release_all(&self) {
        self.lock().pressed.clear();
    }

    pub fn set_sensor(&self, port: SensorPort, value: f64) {
        self.lock().sensors.insert(port, value);
    }

    /// Sounds played so far, oldest first
    pub fn played(&self) -> Vec<Sound> {
        self.lock().sounds.clone()
    }

    /// Lines currently drawn on the display
    pub fn display(&self) -> Vec<String> {
        self.lock().display.iter().map(|(t, _, _)| t.clone()).collect()
    }

    /// Tones played so far as (frequency, duration)
    pub fn tones(&self) -> Vec<(u32, Duration)> {
        self.lock().tones.clone()
    }

    pub fn led(&self) -> Option<LedColor> {
        self.lock().led
    }

    pub fn motor_speed(&self, port: MotorPort) -> f64 {
        self.lock().motors.get(&port).copied().unwrap_or(0.0)
    }

    /// Number of times the brick was put back into its idle state
    pub fn reset_count(&self) -> usize {
        self.lock().resets
    }
}

impl Default for SimulatedHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for SimulatedHal {
    fn clear_display(&self) {
        self.lock().display.clear();
    }

    fn draw_text(&self, text: &str, x: i32, y: i32) {
        debug!("display ({}, {}): {}", x, y, text);
        self.lock().display.push((text.to_string(), x, y));
    }

    fn stop_all_motors(&self) {
        self.lock().motors.clear();
    }

    fn reset_led(&self) {
        self.lock().led = Some(LedColor::Green);
    }

    fn led_on(&self, color: LedColor) {
        self.lock().led = Some(color);
    }

    fn is_key_pressed(&self, key: Key) -> bool {
        let state = self.lock();
        match key {
            Key::Any => !state.pressed.is_empty(),
            key => state.pressed.contains(&key),
        }
    }

    fn play_file(&self, sound: Sound) {
        debug!("play sound preset {}", sound.preset_id());
        self.lock().sounds.push(sound);
    }

    fn play_tone(&self, frequency: u32, duration: Duration) {
        self.lock().tones.push((frequency, duration));
    }

    fn battery_voltage(&self) -> f64 {
        self.battery_volts
    }

    fn set_motor_speed(&self, port: MotorPort, speed_pct: f64) {
        let mut state = self.lock();
        let speed = speed_pct.clamp(-100.0, 100.0);
        state.motors.insert(port, speed);
        // Advance the tacho so programs waiting on a position make progress.
        *state.positions.entry(port).or_insert(0) += (speed * 10.0) as i64;
    }

    fn stop_motor(&self, port: MotorPort) {
        self.lock().motors.remove(&port);
    }

    fn motor_position(&self, port: MotorPort) -> i64 {
        self.lock().positions.get(&port).copied().unwrap_or(0)
    }

    fn sensor_value(&self, port: SensorPort) -> f64 {
        self.lock().sensors.get(&port).copied().unwrap_or(0.0)
    }

    fn reset_state(&self) {
        self.clear_display();
        self.stop_all_motors();
        self.reset_led();
        self.lock().resets += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("Enter".parse::<Key>().unwrap(), Key::Enter);
        assert_eq!("escape".parse::<Key>().unwrap(), Key::Back);
        assert!("menu".parse::<Key>().is_err());
        assert_eq!("red".parse::<LedColor>().unwrap(), LedColor::Red);
        assert_eq!("b".parse::<MotorPort>().unwrap().name(), 'B');
        assert!("E".parse::<MotorPort>().is_err());
        assert_eq!("3".parse::<SensorPort>().unwrap().number(), 3);
        assert!("5".parse::<SensorPort>().is_err());
    }

    #[test]
    fn test_sound_preset_ids() {
        for id in 0..5 {
            assert_eq!(Sound::from_preset_id(id).unwrap().preset_id(), id);
        }
        assert!(Sound::from_preset_id(9).is_none());
    }

    #[test]
    fn test_any_key() {
        let hal = SimulatedHal::new();
        assert!(!hal.is_key_pressed(Key::Any));
        hal.press(Key::Down);
        assert!(hal.is_key_pressed(Key::Any));
        assert!(hal.is_key_pressed(Key::Down));
        assert!(!hal.is_key_pressed(Key::Enter));
        hal.release_all();
        assert!(!hal.is_key_pressed(Key::Any));
    }

    #[test]
    fn test_reset_state() {
        let hal = SimulatedHal::new();
        let port: MotorPort = "A".parse().unwrap();
        hal.draw_text("hello", 0, 0);
        hal.set_motor_speed(port, 50.0);
        hal.led_on(LedColor::Red);

        hal.reset_state();

        assert!(hal.display().is_empty());
        assert_eq!(hal.motor_speed(port), 0.0);
        assert_eq!(hal.led(), Some(LedColor::Green));
        assert_eq!(hal.reset_count(), 1);
    }
}
