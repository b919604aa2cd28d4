//! Dimensional value parsing.
//!
//! Configuration values may carry physical units ("16cm", "30px"). They are
//! resolved to pixels or millimeters once at startup, using the pixels-per-mm
//! ratio derived from the configured panel size and the screen resolution.

const MM_PER_CM: f64 = 10.0;
const MM_PER_IN: f64 = 25.4;

/// An error produced while parsing a dimensional string.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("'{0}' cannot be parsed as a dimensional value")]
    Malformed(String),

    #[error("unknown unit '{unit}' in '{value}'")]
    UnknownUnit { value: String, unit: String },
}

/// Pixels-per-millimeter ratios of the panel, derived once at startup.
#[derive(Debug, Clone, Copy)]
pub struct Ppmm {
    pub x: f64,
    pub y: f64,
    pub mean: f64,
}

impl Ppmm {
    /// Derive the ratios from the panel's physical size (mm) and the screen
    /// resolution (px).
    pub fn new(dev_w_mm: f64, dev_h_mm: f64, pix_w: u32, pix_h: u32) -> Self {
        let x = f64::from(pix_w) / dev_w_mm;
        let y = f64::from(pix_h) / dev_h_mm;
        Self { x, y, mean: (x + y) / 2.0 }
    }
}

/// Split `"<number><unit>"` into its numeric value and unit suffix.
///
/// A single space between number and unit is tolerated; the decimal
/// separator may be `.` or `,`.
fn split(s: &str) -> Result<(f64, &str), UnitError> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.' && *c != ',' && *c != '+' && *c != '-')
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(end);
    let num = num.replace(',', ".");
    let value: f64 = num.parse().map_err(|_| UnitError::Malformed(s.to_owned()))?;
    Ok((value, unit.trim()))
}

/// Parse a length into millimeters. Accepted units: `cm`, `mm`, `in`.
pub fn millimeters(s: &str) -> Result<f64, UnitError> {
    let (value, unit) = split(s)?;
    match unit {
        "cm" => Ok(value * MM_PER_CM),
        "mm" => Ok(value),
        "in" => Ok(value * MM_PER_IN),
        _ => Err(UnitError::UnknownUnit { value: s.to_owned(), unit: unit.to_owned() }),
    }
}

/// Parse a length into pixels. Accepted units: `px`, `PX`, `cm`, `mm`, `in`,
/// or none (the bare number is already pixels).
pub fn pixels(s: &str, ppmm: &Ppmm) -> Result<f64, UnitError> {
    let (value, unit) = split(s)?;
    match unit {
        "" | "px" | "PX" => Ok(value),
        "cm" => Ok(value * MM_PER_CM * ppmm.mean),
        "mm" => Ok(value * ppmm.mean),
        "in" => Ok(value * MM_PER_IN * ppmm.mean),
        _ => Err(UnitError::UnknownUnit { value: s.to_owned(), unit: unit.to_owned() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ppmm() -> Ppmm {
        // 160 mm x 90 mm panel at 1600x900 -> 10 px/mm in both directions.
        Ppmm::new(160.0, 90.0, 1600, 900)
    }

    #[test]
    fn millimeter_units() {
        assert_eq!(millimeters("16cm").unwrap(), 160.0);
        assert_eq!(millimeters("9 cm").unwrap(), 90.0);
        assert_eq!(millimeters("12mm").unwrap(), 12.0);
        assert_eq!(millimeters("1in").unwrap(), 25.4);
        assert_eq!(millimeters("1,5cm").unwrap(), 15.0);
    }

    #[test]
    fn pixel_units() {
        let p = ppmm();
        assert_eq!(pixels("30px", &p).unwrap(), 30.0);
        assert_eq!(pixels("30PX", &p).unwrap(), 30.0);
        assert_eq!(pixels("30", &p).unwrap(), 30.0);
        assert_eq!(pixels("2cm", &p).unwrap(), 200.0);
        assert_eq!(pixels("5mm", &p).unwrap(), 50.0);
        assert_eq!(pixels("1in", &p).unwrap(), 254.0);
    }

    #[test]
    fn rejects_garbage() {
        let p = ppmm();
        assert!(pixels("fast", &p).is_err());
        assert!(pixels("30fathoms", &p).is_err());
        assert!(millimeters("30px").is_err());
        assert!(millimeters("").is_err());
    }

    #[test]
    fn ppmm_mean() {
        let p = Ppmm::new(160.0, 90.0, 1920, 1080);
        assert!((p.x - 12.0).abs() < 1e-9);
        assert!((p.y - 12.0).abs() < 1e-9);
        assert!((p.mean - 12.0).abs() < 1e-9);
    }
}
