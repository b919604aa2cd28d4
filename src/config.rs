//! Configuration loading.
//!
//! The config file is an INI dialect: `[section]` headers, key/value pairs
//! separated by any of `:=` with optional surrounding spaces, comments
//! starting with any of `#;` (inline comments allowed after values), and
//! line continuation on a trailing `\`. Values are coerced by shape: bools
//! (`on`/`off`/`true`/`false`/`0`/`1`), decimal/hex/binary integers, floats,
//! empty -> null, anything else stays a string.
//!
//! [`Options::resolve`] turns the raw store into the typed option set the
//! gesture engine consumes, applying defaults and resolving dimensional
//! values and formulas.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::formula::{Formula, FormulaError};
use crate::frame::Screen;
use crate::units::{self, Ppmm, UnitError};

const SECTION_DEFAULT: &str = "default";
const ASSIGN_CHARS: [char; 2] = [':', '='];
const COMMENT_CHARS: [char; 2] = ['#', ';'];

/// Fallback screen geometry when `pixW`/`pixH` are not configured.
const FALLBACK_SCREEN: Screen = Screen { width: 1920, height: 1080 };

/// An error produced while loading or resolving the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),

    #[error("key '{key}' exists in {count} sections")]
    DuplicateKey { key: String, count: usize },

    #[error("key '{key}': expected a {expected} value")]
    BadValue { key: String, expected: &'static str },

    #[error("key '{key}': {source}")]
    Unit {
        key: String,
        #[source]
        source: UnitError,
    },

    #[error("key '{key}': {source}")]
    Formula {
        key: String,
        #[source]
        source: FormulaError,
    },
}

/// A configuration value after type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Coerce a raw string by shape. Boolean words win over the integer
    /// rule, so `1` is `true` rather than `1`.
    pub fn guess(raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        match raw.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => return Value::Bool(true),
            "off" | "false" | "0" => return Value::Bool(false),
            _ => {}
        }
        if let Some(hex) = raw.strip_prefix("0x") {
            if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                if let Ok(n) = i64::from_str_radix(hex, 16) {
                    return Value::Int(n);
                }
            }
        }
        if let Some(bin) = raw.strip_prefix("0b") {
            if !bin.is_empty() && bin.chars().all(|c| c == '0' || c == '1') {
                if let Ok(n) = i64::from_str_radix(bin, 2) {
                    return Value::Int(n);
                }
            }
        }
        let body = raw.strip_prefix(['+', '-']).unwrap_or(raw);
        if !body.is_empty() && body.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = raw.parse() {
                return Value::Int(n);
            }
        }
        if body.contains('.')
            && body.chars().all(|c| c.is_ascii_digit() || c == '.')
            && body.chars().filter(|c| *c == '.').count() == 1
        {
            if let Ok(f) = raw.parse() {
                return Value::Float(f);
            }
        }
        Value::Str(raw.to_owned())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            // Booleans double as 0/1: the coercion turns a bare "1" into a
            // bool before the integer rule gets a look at it.
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Bool(b) => Some(u32::from(*b)),
            Value::Int(n) => u32::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// The raw key/value store read from the config file.
#[derive(Debug, Default)]
pub struct Config {
    sections: Vec<(String, Vec<(String, Value)>)>,
}

impl Config {
    /// Read and parse `path`. A missing file is not an error: the daemon
    /// runs on defaults, like the original driver did.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::warn!("config file {} not found, using defaults", path.display());
                Ok(Config::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse the INI dialect described in the module docs.
    pub fn parse(text: &str) -> Config {
        let mut config = Config::default();
        let mut section = SECTION_DEFAULT.to_owned();

        let mut lines = text.lines();
        while let Some(line) = lines.next() {
            // Continuation: a trailing backslash folds the next line in.
            let mut logical = line.to_owned();
            while let Some(stripped) = logical.strip_suffix('\\') {
                logical = stripped.to_owned();
                match lines.next() {
                    Some(next) => logical.push_str(next),
                    None => break,
                }
            }

            let trimmed = logical.trim();
            if trimmed.is_empty() || trimmed.starts_with(COMMENT_CHARS) {
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix('[') {
                if let Some(end) = rest.find(']') {
                    section = rest[..end].to_owned();
                    continue;
                }
            }

            let Some(sep) = trimmed.find(ASSIGN_CHARS) else {
                log::debug!("ignoring unparseable config line: {trimmed:?}");
                continue;
            };
            let key = trimmed[..sep].trim();
            let mut value = trimmed[sep + 1..].trim();
            if let Some(comment) = value.find(COMMENT_CHARS) {
                value = value[..comment].trim_end();
            }
            if key.is_empty() {
                log::debug!("ignoring config line with empty key: {trimmed:?}");
                continue;
            }
            config.set(&section, key, Value::guess(value));
        }
        config
    }

    /// Insert or overwrite a key within a section.
    pub fn set(&mut self, section: &str, key: &str, value: Value) {
        let idx = match self.sections.iter().position(|(name, _)| name == section) {
            Some(idx) => idx,
            None => {
                self.sections.push((section.to_owned(), Vec::new()));
                self.sections.len() - 1
            }
        };
        let entries = &mut self.sections[idx].1;
        match entries.iter_mut().find(|(name, _)| name == key) {
            Some((_, slot)) => *slot = value,
            None => entries.push((key.to_owned(), value)),
        }
    }

    /// Look a key up across all sections. A key present in more than one
    /// section is ambiguous and rejected.
    pub fn get(&self, key: &str) -> Result<Option<&Value>, ConfigError> {
        let mut found = None;
        let mut count = 0;
        for (_, entries) in &self.sections {
            if let Some((_, value)) = entries.iter().find(|(name, _)| name == key) {
                found = Some(value);
                count += 1;
            }
        }
        if count > 1 {
            return Err(ConfigError::DuplicateKey { key: key.to_owned(), count });
        }
        Ok(found)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (section, entries) in &self.sections {
            writeln!(f, "[{section}]")?;
            for (key, value) in entries {
                writeln!(f, "    {key} = {value:?}")?;
            }
        }
        Ok(())
    }
}

/// The typed option set consumed by the gesture engine, resolved once at
/// startup.
#[derive(Debug, Clone)]
pub struct Options {
    pub screen: Screen,
    pub ppmm: Ppmm,
    pub drag_dist_px: f64,
    pub sgl_click_time: Duration,
    pub dbl_click_time: Duration,
    pub long_click_time: Duration,
    pub right_click_delay: Duration,
    pub gesture_dead_time: Duration,
    pub pinch_angle_threshold: f64,
    pub parallel_angle_threshold: f64,
    pub direction_angle_threshold: f64,
    pub pinch_clicks_formula: Formula,
    pub scroll_amount_formula: Formula,
    pub hor_scroll_amount_formula: Formula,
    pub move_gesture_formula: Formula,
    pub enh_sgl_click: bool,
    pub enh_dbl_click: bool,
    pub hold_for_right_click: bool,
    pub pinch_to_zoom: bool,
    pub live: bool,
    pub zoom_mode_ctrl_plus_minus: bool,
    pub enable_horizontal_scroll: bool,
}

impl Options {
    pub fn resolve(config: &Config) -> Result<Options, ConfigError> {
        let screen = Screen {
            width: get_u32(config, "pixW")?.unwrap_or(FALLBACK_SCREEN.width),
            height: get_u32(config, "pixH")?.unwrap_or(FALLBACK_SCREEN.height),
        };
        let dev_w = get_length_mm(config, "devW", "16cm")?;
        let dev_h = get_length_mm(config, "devH", "9cm")?;
        let ppmm = Ppmm::new(dev_w, dev_h, screen.width, screen.height);

        let right_click_delay = get_seconds(config, "rightClickDelay", 0.4)?;
        // longClickTime has no default of its own; holding as long as the
        // right-click delay counts as a long press.
        let long_click_time = match get_raw_seconds(config, "longClickTime")? {
            Some(secs) => Duration::from_secs_f64(secs),
            None => right_click_delay,
        };

        Ok(Options {
            screen,
            ppmm,
            drag_dist_px: get_pixels(config, "dragDist", 30.0, &ppmm)?,
            sgl_click_time: get_seconds(config, "sglClickTime", 0.2)?,
            dbl_click_time: get_seconds(config, "dblClickTime", 0.4)?,
            long_click_time,
            right_click_delay,
            gesture_dead_time: get_seconds(config, "gestureDeadTime", 0.1)?,
            pinch_angle_threshold: get_f64(config, "pinchAngleThreshold", 30.0)?,
            parallel_angle_threshold: get_f64(config, "parallelAngleThreshold", 30.0)?,
            direction_angle_threshold: get_f64(config, "directionAngleThreshold", 15.0)?,
            pinch_clicks_formula: get_formula(config, "pinchToZoomClicksFormula", "1")?,
            scroll_amount_formula: get_formula(config, "scrollAmountFormula", "l/10")?,
            hor_scroll_amount_formula: get_formula(config, "horScrollAmountFormula", "l/15")?,
            move_gesture_formula: get_formula(config, "moveGestureFormula", "l/10")?,
            enh_sgl_click: get_bool(config, "enhSglClick", false)?,
            enh_dbl_click: get_bool(config, "enhDblClick", false)?,
            hold_for_right_click: get_bool(config, "holdForRightClick", false)?,
            pinch_to_zoom: get_bool(config, "pinchToZoom", false)?,
            live: get_bool(config, "live", false)?,
            zoom_mode_ctrl_plus_minus: get_bool(config, "zoomModeCtrlPlusMinus", true)?,
            enable_horizontal_scroll: get_bool(config, "enableHorizontalScroll", true)?,
        })
    }
}

fn get_bool(config: &Config, key: &str, default: bool) -> Result<bool, ConfigError> {
    match config.get(key)? {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            value.as_bool().ok_or(ConfigError::BadValue { key: key.to_owned(), expected: "boolean" })
        }
    }
}

fn get_f64(config: &Config, key: &str, default: f64) -> Result<f64, ConfigError> {
    match config.get(key)? {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            value.as_f64().ok_or(ConfigError::BadValue { key: key.to_owned(), expected: "numeric" })
        }
    }
}

fn get_u32(config: &Config, key: &str) -> Result<Option<u32>, ConfigError> {
    match config.get(key)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u32()
            .map(Some)
            .ok_or(ConfigError::BadValue { key: key.to_owned(), expected: "positive integer" }),
    }
}

fn get_raw_seconds(config: &Config, key: &str) -> Result<Option<f64>, ConfigError> {
    match config.get(key)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_f64() {
            Some(secs) if secs >= 0.0 => Ok(Some(secs)),
            _ => Err(ConfigError::BadValue { key: key.to_owned(), expected: "non-negative seconds" }),
        },
    }
}

fn get_seconds(config: &Config, key: &str, default: f64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs_f64(get_raw_seconds(config, key)?.unwrap_or(default)))
}

/// A physical length in millimeters; only unit-suffixed strings make sense
/// here.
fn get_length_mm(config: &Config, key: &str, default: &str) -> Result<f64, ConfigError> {
    let raw = match config.get(key)? {
        None | Some(Value::Null) => default.to_owned(),
        Some(Value::Str(s)) => s.clone(),
        Some(_) => {
            return Err(ConfigError::BadValue { key: key.to_owned(), expected: "length with unit" })
        }
    };
    units::millimeters(&raw).map_err(|source| ConfigError::Unit { key: key.to_owned(), source })
}

/// A length in pixels; bare numbers are pixels, strings may carry units.
fn get_pixels(config: &Config, key: &str, default: f64, ppmm: &Ppmm) -> Result<f64, ConfigError> {
    match config.get(key)? {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Str(s)) => {
            units::pixels(s, ppmm).map_err(|source| ConfigError::Unit { key: key.to_owned(), source })
        }
        Some(value) => {
            value.as_f64().ok_or(ConfigError::BadValue { key: key.to_owned(), expected: "length" })
        }
    }
}

fn get_formula(config: &Config, key: &str, default: &str) -> Result<Formula, ConfigError> {
    // Bare numbers were coerced during parsing; re-render them for the
    // formula parser.
    let parsed = match config.get(key)? {
        None | Some(Value::Null) => Formula::parse(default),
        Some(Value::Str(s)) => Formula::parse(s),
        Some(Value::Int(n)) => Formula::parse(&n.to_string()),
        Some(Value::Float(f)) => Formula::parse(&f.to_string()),
        Some(Value::Bool(b)) => Formula::parse(if *b { "1" } else { "0" }),
    };
    parsed.map_err(|source| ConfigError::Formula { key: key.to_owned(), source })
}
