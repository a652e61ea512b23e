//! Encoder preset system for H.264 output
//!
//! Five quality levels (1–5) map to encoder-specific properties:
//!
//! - **Level 1**: Lightest (fastest encode, lowest quality)
//! - **Level 2**: Light
//! - **Level 3**: Balanced (default)
//! - **Level 4**: Quality
//! - **Level 5**: Maximum (slowest encode, highest quality)
//!
//! Composed videos are mostly long runs of identical frames, so constant
//! quantizer / constant quality modes are used where the encoder has them.
//!
//! ## Adding presets for a new encoder
//!
//! 1. Add a new `apply_<vendor>()` function in this file, matching on `level`.
//! 2. Add a match arm in [`apply_preset()`] for your [`HardwareEncoderType`].
//! 3. Only set properties through [`set_property_checked`]: element
//!    properties differ between GStreamer releases.

use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;

use super::encoder::HardwareEncoderType;

/// Minimum preset level (lightest computational load)
pub const MIN_PRESET: u8 = 1;
/// Maximum preset level (highest quality, most intensive)
pub const MAX_PRESET: u8 = 5;
/// Default preset level (balanced)
pub const DEFAULT_PRESET: u8 = 3;

/// Get a human-readable label for a preset level.
pub fn preset_label(level: u8) -> &'static str {
    match level.clamp(MIN_PRESET, MAX_PRESET) {
        1 => "Lightest",
        2 => "Light",
        3 => "Balanced",
        4 => "Quality",
        _ => "Maximum",
    }
}

/// Quantizer used for a preset level (lower = better quality)
pub fn quantizer_for_level(level: u8) -> u32 {
    match level.clamp(MIN_PRESET, MAX_PRESET) {
        1 => 32,
        2 => 27,
        3 => 23,
        4 => 20,
        _ => 17,
    }
}

/// Apply encoder-specific parameters for the given preset level.
///
/// # Arguments
/// * `encoder` - the GStreamer encoder element to configure
/// * `hw_type` - the hardware encoder type being used
/// * `level` - preset level (1–5; clamped internally)
/// * `keyframe_interval` - keyframe interval in frames (0 = encoder default)
pub fn apply_preset(
    encoder: &gst::Element,
    hw_type: HardwareEncoderType,
    level: u8,
    keyframe_interval: u32,
) {
    let level = level.clamp(MIN_PRESET, MAX_PRESET);
    log::debug!(
        "Applying preset {} ({}) to {}",
        level,
        preset_label(level),
        hw_type.display_name()
    );

    match hw_type {
        HardwareEncoderType::Software => apply_x264(encoder, level, keyframe_interval),
        HardwareEncoderType::Nvenc => apply_nvenc(encoder, level, keyframe_interval),
        HardwareEncoderType::Amf | HardwareEncoderType::Qsv | HardwareEncoderType::VaApi => {
            apply_generic_hw(encoder, level, keyframe_interval)
        }
    }
}

fn apply_x264(encoder: &gst::Element, level: u8, keyframe_interval: u32) {
    let speed = match level {
        1 => "ultrafast",
        2 => "veryfast",
        3 => "faster",
        4 => "medium",
        _ => "slow",
    };
    set_property_checked(encoder, "speed-preset", PropValue::Nick(speed));
    set_property_checked(encoder, "pass", PropValue::Nick("quant"));
    set_property_checked(encoder, "quantizer", PropValue::Uint(quantizer_for_level(level)));
    if keyframe_interval > 0 {
        set_property_checked(encoder, "key-int-max", PropValue::Uint(keyframe_interval));
    }
}

fn apply_nvenc(encoder: &gst::Element, level: u8, keyframe_interval: u32) {
    set_property_checked(encoder, "rc-mode", PropValue::Nick("constqp"));
    let qp = quantizer_for_level(level);
    set_property_checked(encoder, "qp-const", PropValue::Int(qp as i32));
    if keyframe_interval > 0 {
        set_property_checked(encoder, "gop-size", PropValue::Int(keyframe_interval as i32));
    }
}

fn apply_generic_hw(encoder: &gst::Element, level: u8, keyframe_interval: u32) {
    let qp = quantizer_for_level(level);
    set_property_checked(encoder, "qp-i", PropValue::Uint(qp));
    set_property_checked(encoder, "qp-p", PropValue::Uint(qp));
    if keyframe_interval > 0 {
        set_property_checked(encoder, "key-int-max", PropValue::Uint(keyframe_interval));
        set_property_checked(encoder, "gop-size", PropValue::Int(keyframe_interval as i32));
    }
}

/// Property value in the shapes encoder elements use
#[derive(Debug, Clone, Copy)]
pub enum PropValue<'a> {
    /// Enum nick or any value parseable from a string
    Nick(&'a str),
    Uint(u32),
    Int(i32),
}

/// Set a property only if the element has it with a compatible type.
///
/// `set_property` panics on unknown properties or type mismatches, and
/// properties vary between plugin versions, so presets go through here.
/// Returns whether the property was set.
pub fn set_property_checked(element: &gst::Element, name: &str, value: PropValue<'_>) -> bool {
    let Some(pspec) = element.find_property(name) else {
        log::debug!("Encoder has no '{}' property, skipping", name);
        return false;
    };
    let value_type = pspec.value_type();

    match value {
        PropValue::Nick(nick) => {
            if value_type.is_a(glib::Type::ENUM) || value_type == glib::Type::STRING {
                element.set_property_from_str(name, nick);
                true
            } else {
                false
            }
        }
        PropValue::Uint(v) if value_type == glib::Type::U32 => {
            element.set_property(name, v);
            true
        }
        PropValue::Uint(v) if value_type == glib::Type::I32 => {
            element.set_property(name, v.min(i32::MAX as u32) as i32);
            true
        }
        PropValue::Int(v) if value_type == glib::Type::I32 => {
            element.set_property(name, v);
            true
        }
        PropValue::Int(v) if value_type == glib::Type::U32 && v >= 0 => {
            element.set_property(name, v as u32);
            true
        }
        _ => {
            log::debug!("Property '{}' has unexpected type {}, skipping", name, value_type);
            false
        }
    }
}
