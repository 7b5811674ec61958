use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Number of samples kept in every rolling buffer
pub const MAX_STATS: usize = 60;

/// Raw value standing in for "no reading available"
pub const MISSING_VALUE: i16 = i16::MIN;

/// Glyph stored when the forecast code is unknown
pub const UNKNOWN_GLYPH: char = '\0';

/// Any value below this floor is treated as missing
const MISSING_FLOOR: f64 = -32767.0;

/// A scalar sensor value with an out-of-range "missing" state
///
/// There is no separate validity flag: a reading below the floor is absent.
/// This keeps the representation identical to what the display side reads
/// from the rolling buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading(f64);

impl Reading {
    pub const MISSING: Reading = Reading(MISSING_VALUE as f64);

    pub fn new(value: f64) -> Self {
        Reading(value)
    }

    /// Wrap an optional value, mapping `None` to the missing sentinel
    pub fn from_option(value: Option<f64>) -> Self {
        value.map(Reading).unwrap_or(Reading::MISSING)
    }

    pub fn is_missing(&self) -> bool {
        // NaN never compares below the floor, so check it explicitly
        self.0.is_nan() || self.0 < MISSING_FLOOR
    }

    pub fn value(&self) -> Option<f64> {
        if self.is_missing() {
            None
        } else {
            Some(self.0)
        }
    }

    /// Fixed-point tenths for a buffer slot (21.34 -> 213)
    pub fn to_tenths(&self) -> i16 {
        self.to_sample(10.0)
    }

    /// Whole units for a buffer slot (1234.6 -> 1235)
    pub fn to_whole(&self) -> i16 {
        self.to_sample(1.0)
    }

    fn to_sample(&self, scale: f64) -> i16 {
        match self.value() {
            // Float to int casts saturate; clamp above the sentinel so a real
            // but extreme value never turns into "missing"
            Some(v) => ((v * scale).round() as i16).max(MISSING_VALUE + 1),
            None => MISSING_VALUE,
        }
    }
}

impl Default for Reading {
    fn default() -> Self {
        Reading::MISSING
    }
}

/// Whether a raw buffer slot holds the missing sentinel
pub fn is_missing_sample(sample: i16) -> bool {
    sample < MISSING_VALUE + 1
}

/// Fixed-capacity series of the most recent samples, oldest first
///
/// Length is always exactly `MAX_STATS`; pushing a new sample shifts
/// everything left by one and writes the new value at the tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingBuffer {
    slots: [i16; MAX_STATS],
}

impl RollingBuffer {
    pub fn new() -> Self {
        RollingBuffer {
            slots: [MISSING_VALUE; MAX_STATS],
        }
    }

    /// Evict the oldest slot and append `sample` at the tail
    pub fn push(&mut self, sample: i16) {
        self.slots.copy_within(1.., 0);
        self.slots[MAX_STATS - 1] = sample;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Most recently pushed slot (may be the missing sentinel)
    pub fn tail(&self) -> i16 {
        self.slots[MAX_STATS - 1]
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.slots
    }

    pub fn iter(&self) -> impl Iterator<Item = i16> + '_ {
        self.slots.iter().copied()
    }

    /// Minimum, maximum and average over the slots that hold a value
    ///
    /// Missing slots are skipped entirely, so the sentinel never shows up
    /// as a minimum. Returns `None` when every slot is missing.
    pub fn stats(&self) -> Option<BufferStats> {
        let mut min = i16::MAX;
        let mut max = i16::MIN;
        let mut sum: i64 = 0;
        let mut samples = 0usize;

        for v in self.iter().filter(|v| !is_missing_sample(*v)) {
            min = min.min(v);
            max = max.max(v);
            sum += i64::from(v);
            samples += 1;
        }

        if samples == 0 {
            return None;
        }

        Some(BufferStats {
            min,
            max,
            average: sum as f64 / samples as f64,
            samples,
        })
    }
}

impl Default for RollingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of the valid slots of a rolling buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferStats {
    pub min: i16,
    pub max: i16,
    pub average: f64,
    pub samples: usize,
}

/// Forecast code received from the broker and its display glyph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastSymbol {
    pub code: i32,
    pub glyph: char,
}

impl ForecastSymbol {
    pub const UNKNOWN: ForecastSymbol = ForecastSymbol {
        code: 0,
        glyph: UNKNOWN_GLYPH,
    };

    /// Map a raw forecast code through the weather font table
    pub fn from_code(code: i32) -> Self {
        ForecastSymbol {
            code,
            glyph: glyph_for_code(code),
        }
    }

    pub fn is_known(&self) -> bool {
        self.glyph != UNKNOWN_GLYPH
    }
}

impl Default for ForecastSymbol {
    fn default() -> Self {
        ForecastSymbol::UNKNOWN
    }
}

// Weather font characters in the order of the codes they draw
const GLYPH_TABLE: [(char, i32); 27] = [
    ('A', 1),
    ('B', 2),
    ('C', 3),
    ('D', 21),
    ('E', 22),
    ('F', 23),
    ('G', 31),
    ('H', 32),
    ('I', 33),
    ('J', 41),
    ('K', 42),
    ('L', 43),
    ('M', 51),
    ('N', 52),
    ('O', 53),
    ('P', 61),
    ('Q', 62),
    ('R', 63),
    ('S', 64),
    ('T', 71),
    ('U', 72),
    ('V', 73),
    ('W', 81),
    ('X', 82),
    ('Y', 83),
    ('Z', 91),
    ('a', 92),
];

static GLYPHS: Lazy<HashMap<i32, char>> = Lazy::new(|| {
    let mut glyphs = HashMap::with_capacity(GLYPH_TABLE.len());
    for (glyph, code) in GLYPH_TABLE {
        // first entry for a code wins
        glyphs.entry(code).or_insert(glyph);
    }
    glyphs
});

/// Display glyph for a forecast code, `UNKNOWN_GLYPH` when the code has none
pub fn glyph_for_code(code: i32) -> char {
    GLYPHS.get(&code).copied().unwrap_or(UNKNOWN_GLYPH)
}
