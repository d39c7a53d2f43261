//! Single-character code tables carried in event headers and station
//! configuration packets.
//!
//! Unmapped codes return `None`; callers drop the field rather than guess.

/// Preamplifier gain code.
pub fn gain(code: char) -> Option<&'static str> {
    match code {
        ' ' => Some("Unknown"),
        '1' => Some("x1"),
        '2' => Some("x8"),
        '3' => Some("x32"),
        '4' => Some("x128"),
        '5' => Some("x512"),
        '6' => Some("x2048"),
        '7' => Some("x8192"),
        '8' => Some("x100"),
        'A' => Some("12dB"),
        'B' => Some("24dB"),
        'C' => Some("36dB"),
        'D' => Some("48dB"),
        'E' => Some("60dB"),
        'F' => Some("x2"),
        'G' => Some("x4"),
        'H' => Some("x16"),
        'I' => Some("x64"),
        'J' => Some("x256"),
        _ => None,
    }
}

/// A/D converter resolution in bits.
pub fn ad_resolution(code: char) -> Option<&'static str> {
    match code {
        ' ' => Some("Unknown"),
        '1' => Some("8"),
        '2' => Some("16"),
        '3' => Some("24"),
        _ => None,
    }
}

/// Full-scale analog input range in volts.
pub fn full_scale_analog(code: char) -> Option<&'static str> {
    match code {
        ' ' => Some("Unknown"),
        '1' => Some("+/-3.75"),
        '2' => Some("+/-5.0"),
        '3' => Some("+/-10.0"),
        '4' => Some("+/-20.0"),
        _ => None,
    }
}

/// Timing subsystem source.
pub fn time_source(code: char) -> Option<&'static str> {
    match code {
        ' ' => Some("Unknown"),
        '1' => Some("Internal"),
        '2' => Some("GPS"),
        _ => None,
    }
}

/// Timing quality: days since the phase-locked loop last had lock.
pub fn time_quality(code: char) -> Option<&'static str> {
    match code {
        ' ' => Some("Unknown"),
        '?' => Some("No PLL"),
        '0' => Some("0 days since PLL"),
        '1' => Some("1 days since PLL"),
        '2' => Some("2 days since PLL"),
        '3' => Some("3 days since PLL"),
        '4' => Some("4 days since PLL"),
        '5' => Some("5 days since PLL"),
        '6' => Some("6 days since PLL"),
        '7' => Some("7 days since PLL"),
        '8' => Some("8 days since PLL"),
        '9' => Some("9 days since PLL"),
        _ => None,
    }
}

/// Per-count bit weight for the gains the hardware tables cover.
pub fn bit_weight(gain: &str) -> Option<&'static str> {
    match gain {
        "x1" => Some("1.5895uV"),
        "x32" => Some("49.671uV"),
        _ => None,
    }
}
