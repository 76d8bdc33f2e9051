use crate::config::{
    ColorPreset, SimulationSettings, SlimeConfig, SpawnPattern, SPECIES_COUNT,
};
use crate::storage::settings_from_json;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD, PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

pub const DELTA_VERSION: u8 = 2;
pub const FIXED_BINARY_VERSION: u8 = 1;
pub const FIXED_BINARY_LEN: usize = 37;

const FIELD_SPEED: u8 = 0;
const FIELD_RENDERER: u8 = 1;
const FIELD_DECAY_RATE: u8 = 2;
const FIELD_DIFFUSE_WEIGHT: u8 = 3;
const FIELD_SPAWN_PATTERNS: u8 = 4;
const FIELD_AGENT_COUNT: u8 = 5;
const FIELD_SPECIES_BASE: [u8; SPECIES_COUNT] = [10, 20, 30];
const FIELD_INTERACTION_BASE: u8 = 40;

const SPECIES_FIELD_COUNT: u8 = 7;

/// Offsets within a species block, shared by the delta and fixed layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SpeciesField {
    SensorAngle = 0,
    TurnAngle = 1,
    SensorDist = 2,
    AgentSpeed = 3,
    DepositAmount = 4,
    ColorPreset = 5,
    AgentCount = 6,
}

impl SpeciesField {
    const ALL: [SpeciesField; SPECIES_FIELD_COUNT as usize] = [
        SpeciesField::SensorAngle,
        SpeciesField::TurnAngle,
        SpeciesField::SensorDist,
        SpeciesField::AgentSpeed,
        SpeciesField::DepositAmount,
        SpeciesField::ColorPreset,
        SpeciesField::AgentCount,
    ];
}

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, u8::MAX as f64) as u8
}

fn to_i8(value: f64) -> i8 {
    value.round().clamp(i8::MIN as f64, i8::MAX as f64) as i8
}

fn to_u16(value: f64) -> u16 {
    value.round().clamp(0.0, u16::MAX as f64) as u16
}

fn pattern_mask(patterns: &[SpawnPattern]) -> u8 {
    patterns.iter().fold(0, |mask, p| mask | (1 << p.index()))
}

fn patterns_from_mask(mask: u8) -> Vec<SpawnPattern> {
    SpawnPattern::ALL
        .into_iter()
        .filter(|p| mask & (1 << p.index()) != 0)
        .collect()
}

fn preset_from_index(index: u8) -> ColorPreset {
    ColorPreset::from_index(index as usize).unwrap_or(ColorPreset::Neon)
}

/// Quantized wire value of one species field.
fn species_value(config: &SlimeConfig, species: usize, field: SpeciesField) -> u8 {
    let s = &config.species[species];
    match field {
        SpeciesField::SensorAngle => to_u8(s.sensor_angle * 100.0),
        SpeciesField::TurnAngle => to_u8(s.turn_angle * 100.0),
        SpeciesField::SensorDist => to_u8(s.sensor_dist),
        SpeciesField::AgentSpeed => to_u8(s.agent_speed * 10.0),
        SpeciesField::DepositAmount => to_u8(s.deposit_amount),
        SpeciesField::ColorPreset => s.color_preset.index() as u8,
        SpeciesField::AgentCount => to_u8(s.agent_count),
    }
}

fn apply_species_value(config: &mut SlimeConfig, species: usize, field: SpeciesField, value: u8) {
    let s = &mut config.species[species];
    let v = value as f64;
    match field {
        SpeciesField::SensorAngle => s.sensor_angle = v / 100.0,
        SpeciesField::TurnAngle => s.turn_angle = v / 100.0,
        SpeciesField::SensorDist => s.sensor_dist = v,
        SpeciesField::AgentSpeed => s.agent_speed = v / 10.0,
        SpeciesField::DepositAmount => s.deposit_amount = v,
        SpeciesField::ColorPreset => s.color_preset = preset_from_index(value),
        SpeciesField::AgentCount => s.agent_count = v,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldValue {
    Byte(u8),
    Word(u16),
}

fn field_is_word(id: u8) -> bool {
    id == FIELD_AGENT_COUNT
}

/// Fields of `settings` whose quantized value differs from the defaults.
fn delta_fields(settings: &SimulationSettings) -> Vec<(u8, FieldValue)> {
    let defaults = SimulationSettings::default();
    let (cfg, def) = (&settings.slime_config, &defaults.slime_config);
    let mut fields = Vec::new();
    let mut push_byte = |id: u8, value: u8, default: u8| {
        if value != default {
            fields.push((id, FieldValue::Byte(value)));
        }
    };

    push_byte(FIELD_SPEED, to_u8(settings.speed), to_u8(defaults.speed));
    push_byte(
        FIELD_DECAY_RATE,
        to_u8(cfg.decay_rate * 10.0),
        to_u8(def.decay_rate * 10.0),
    );
    push_byte(
        FIELD_DIFFUSE_WEIGHT,
        to_u8(cfg.diffuse_weight * 100.0),
        to_u8(def.diffuse_weight * 100.0),
    );
    push_byte(
        FIELD_SPAWN_PATTERNS,
        pattern_mask(&cfg.enabled_spawn_patterns),
        pattern_mask(&def.enabled_spawn_patterns),
    );
    for (species, base) in FIELD_SPECIES_BASE.iter().enumerate() {
        for field in SpeciesField::ALL {
            push_byte(
                base + field as u8,
                species_value(cfg, species, field),
                species_value(def, species, field),
            );
        }
    }
    for row in 0..SPECIES_COUNT {
        for col in 0..SPECIES_COUNT {
            push_byte(
                FIELD_INTERACTION_BASE + (row * SPECIES_COUNT + col) as u8,
                to_i8(cfg.interactions[row][col] * 100.0) as u8,
                to_i8(def.interactions[row][col] * 100.0) as u8,
            );
        }
    }

    let agent_count = to_u16(cfg.agent_count * 100.0);
    if agent_count != to_u16(def.agent_count * 100.0) {
        fields.push((FIELD_AGENT_COUNT, FieldValue::Word(agent_count)));
    }
    fields.sort_by_key(|(id, _)| *id);
    fields
}

/// Raw delta payload before base64: `[2, n, (id, value)*n]`, holding only the fields that
/// differ from the defaults.
///
/// | id      | field                         | encoding            |
/// |---------|-------------------------------|---------------------|
/// | 0       | speed                         | u8                  |
/// | 1       | reserved (renderer flag)      | ignored             |
/// | 2       | decay rate                    | u8, x10             |
/// | 3       | diffuse weight                | u8, x100            |
/// | 4       | spawn pattern bitmask         | u8                  |
/// | 5       | agent count                   | u16 LE, x100        |
/// | 10+k*10 | species k, offsets 0..=6      | see `SpeciesField`  |
/// | 40..=48 | interactions, row-major       | i8 as u8, x100      |
pub fn encode_settings_bytes(settings: &SimulationSettings) -> Vec<u8> {
    let fields = delta_fields(settings);
    let mut bytes = Vec::with_capacity(2 + fields.len() * 3);
    bytes.push(DELTA_VERSION);
    bytes.push(fields.len() as u8);
    for (id, value) in fields {
        bytes.push(id);
        match value {
            FieldValue::Byte(v) => bytes.push(v),
            FieldValue::Word(v) => bytes.extend_from_slice(&v.to_le_bytes()),
        }
    }
    bytes
}

/// URL-safe, unpadded base64 share string.
pub fn encode_settings(settings: &SimulationSettings) -> String {
    URL_SAFE_LENIENT.encode(encode_settings_bytes(settings))
}

/// Decode a share string. Tries delta, then the fixed 37-byte layout, then base64 JSON.
/// Returns `None` unless one of them yields settings that pass validation.
pub fn decode_settings(encoded: &str) -> Option<SimulationSettings> {
    let trimmed = encoded.trim();
    if let Ok(bytes) = URL_SAFE_LENIENT.decode(trimmed) {
        if bytes.len() >= 2 {
            if bytes[0] == DELTA_VERSION {
                if let Some(settings) = decode_delta(&bytes) {
                    return Some(settings);
                }
            } else if bytes[0] == FIXED_BINARY_VERSION && bytes.len() == FIXED_BINARY_LEN {
                if let Some(settings) = decode_fixed(&bytes) {
                    return Some(settings);
                }
            }
        }
    }
    decode_legacy_json(trimmed)
}

fn valid(settings: SimulationSettings) -> Option<SimulationSettings> {
    settings.validate().ok().map(|()| settings)
}

fn decode_delta(bytes: &[u8]) -> Option<SimulationSettings> {
    let mut settings = SimulationSettings::default();
    let count = bytes[1] as usize;
    let mut offset = 2;
    // Truncated payloads keep whatever fields were complete.
    for _ in 0..count {
        let Some(&id) = bytes.get(offset) else { break };
        offset += 1;
        let value = if field_is_word(id) {
            let Some(word) = bytes.get(offset..offset + 2) else { break };
            offset += 2;
            FieldValue::Word(u16::from_le_bytes([word[0], word[1]]))
        } else {
            let Some(&byte) = bytes.get(offset) else { break };
            offset += 1;
            FieldValue::Byte(byte)
        };
        apply_field(&mut settings, id, value);
    }
    valid(settings)
}

fn apply_field(settings: &mut SimulationSettings, id: u8, value: FieldValue) {
    let config = &mut settings.slime_config;
    let v = match value {
        FieldValue::Byte(b) => b,
        FieldValue::Word(w) => {
            config.agent_count = w as f64 / 100.0;
            return;
        }
    };
    match id {
        FIELD_SPEED => settings.speed = v as f64,
        FIELD_RENDERER => {}
        FIELD_DECAY_RATE => config.decay_rate = v as f64 / 10.0,
        FIELD_DIFFUSE_WEIGHT => config.diffuse_weight = v as f64 / 100.0,
        FIELD_SPAWN_PATTERNS => config.enabled_spawn_patterns = patterns_from_mask(v),
        10..=16 | 20..=26 | 30..=36 => {
            let species = (id / 10 - 1) as usize;
            let field = SpeciesField::ALL[(id % 10) as usize];
            apply_species_value(config, species, field, v);
        }
        40..=48 => {
            let cell = (id - FIELD_INTERACTION_BASE) as usize;
            config.interactions[cell / SPECIES_COUNT][cell % SPECIES_COUNT] =
                v as i8 as f64 / 100.0;
        }
        _ => {}
    }
}

/// Version 1: `[1, speed, flags, agents u16 LE, decay, diffuse, species x3 (7 bytes), i8 x9]`.
/// The spawn mask sits in `flags >> 1`.
fn decode_fixed(bytes: &[u8]) -> Option<SimulationSettings> {
    let mut settings = SimulationSettings {
        speed: bytes[1] as f64,
        ..SimulationSettings::default()
    };
    let config = &mut settings.slime_config;
    config.enabled_spawn_patterns = patterns_from_mask(bytes[2] >> 1);
    config.agent_count = u16::from_le_bytes([bytes[3], bytes[4]]) as f64 / 100.0;
    config.decay_rate = bytes[5] as f64 / 10.0;
    config.diffuse_weight = bytes[6] as f64 / 100.0;
    for species in 0..SPECIES_COUNT {
        let base = 7 + species * SPECIES_FIELD_COUNT as usize;
        for field in SpeciesField::ALL {
            apply_species_value(config, species, field, bytes[base + field as usize]);
        }
    }
    for (cell, &byte) in bytes[28..37].iter().enumerate() {
        config.interactions[cell / SPECIES_COUNT][cell % SPECIES_COUNT] =
            byte as i8 as f64 / 100.0;
    }
    valid(settings)
}

fn decode_legacy_json(encoded: &str) -> Option<SimulationSettings> {
    let bytes = STANDARD_LENIENT
        .decode(encoded)
        .or_else(|_| URL_SAFE_LENIENT.decode(encoded))
        .ok()?;
    settings_from_json(&bytes)
}
