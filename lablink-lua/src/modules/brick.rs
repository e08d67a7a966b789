//! Hardware capabilities for downloaded programs
//!
//! `brick` is the only way a program can reach the hardware. Every function
//! maps onto one [`Hal`] call; names coming from Lua (ports, keys, colors)
//! are parsed here and rejected with a Lua error when unknown.

use crate::module::LabModule;
use crate::signal::AbortSignal;
use lablink_core::hal::{Hal, Key, LedColor, MotorPort, SensorPort, Sound};
use mlua::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Slice length for `brick.wait`; bounds the cancellation latency of sleeps
const WAIT_SLICE: Duration = Duration::from_millis(10);

pub struct BrickModule {
    hal: Arc<dyn Hal>,
    signal: AbortSignal,
}

impl BrickModule {
    pub fn new(hal: Arc<dyn Hal>, signal: AbortSignal) -> Self {
        Self { hal, signal }
    }
}

fn parse<T>(value: &str) -> LuaResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| LuaError::RuntimeError(e.to_string()))
}

/// Sleeps for `duration` unless the signal is raised first
fn interruptible_sleep(signal: &AbortSignal, duration: Duration) -> LuaResult<()> {
    let mut remaining = duration;
    while !remaining.is_zero() {
        signal.check()?;
        let slice = remaining.min(WAIT_SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
    signal.check()
}

impl LabModule for BrickModule {
    fn id(&self) -> &'static str {
        "brick"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let brick = lua.create_table()?;

        let hal = self.hal.clone();
        brick.set(
            "clear_display",
            lua.create_function(move |_, ()| {
                hal.clear_display();
                Ok(())
            })?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "draw_text",
            lua.create_function(move |_, (msg, x, y): (String, Option<i32>, Option<i32>)| {
                hal.draw_text(&msg, x.unwrap_or(0), y.unwrap_or(0));
                Ok(())
            })?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "led_on",
            lua.create_function(move |_, color: String| {
                hal.led_on(parse::<LedColor>(&color)?);
                Ok(())
            })?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "led_off",
            lua.create_function(move |_, ()| {
                hal.led_on(LedColor::Black);
                Ok(())
            })?,
        )?;

        // Tones block for their duration, like on the device.
        let hal = self.hal.clone();
        let signal = self.signal.clone();
        brick.set(
            "play_tone",
            lua.create_function(move |_, (frequency, ms): (u32, u64)| {
                let duration = Duration::from_millis(ms);
                hal.play_tone(frequency, duration);
                interruptible_sleep(&signal, duration)
            })?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "play_file",
            lua.create_function(move |_, id: u8| {
                let sound = Sound::from_preset_id(id)
                    .ok_or_else(|| LuaError::RuntimeError(format!("unknown sound preset: {}", id)))?;
                hal.play_file(sound);
                Ok(())
            })?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "motor_on",
            lua.create_function(move |_, (port, speed): (String, f64)| {
                hal.set_motor_speed(parse::<MotorPort>(&port)?, speed);
                Ok(())
            })?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "motor_stop",
            lua.create_function(move |_, port: String| {
                hal.stop_motor(parse::<MotorPort>(&port)?);
                Ok(())
            })?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "motor_position",
            lua.create_function(move |_, port: String| {
                Ok(hal.motor_position(parse::<MotorPort>(&port)?))
            })?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "sensor",
            lua.create_function(move |_, port: String| {
                Ok(hal.sensor_value(parse::<SensorPort>(&port)?))
            })?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "is_key_pressed",
            lua.create_function(move |_, key: String| Ok(hal.is_key_pressed(parse::<Key>(&key)?)))?,
        )?;

        let hal = self.hal.clone();
        brick.set(
            "battery",
            lua.create_function(move |_, ()| Ok(hal.battery_voltage()))?,
        )?;

        let signal = self.signal.clone();
        brick.set(
            "wait",
            lua.create_function(move |_, ms: u64| {
                interruptible_sleep(&signal, Duration::from_millis(ms))
            })?,
        )?;

        lua.globals().set(self.id(), brick)?;
        Ok(())
    }
}
