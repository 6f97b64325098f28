//! Safe coercion of loosely-typed upstream cells. NaN, infinities, empty
//! strings and nulls all funnel to `None` rather than propagating as garbage
//! floats or strings (§7, §9).

use crate::types::Cell;

pub fn to_float(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Null => None,
        Cell::Float(f) => {
            if f.is_finite() {
                Some(*f)
            } else {
                None
            }
        }
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == "-" || trimmed.eq_ignore_ascii_case("nan") {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
    }
}

pub fn to_str(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Null => None,
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Cell::Float(f) => {
            if f.is_finite() {
                Some(f.to_string())
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_rejects_nan_and_inf() {
        assert_eq!(to_float(&Cell::Float(f64::NAN)), None);
        assert_eq!(to_float(&Cell::Float(f64::INFINITY)), None);
        assert_eq!(to_float(&Cell::Float(1.5)), Some(1.5));
    }

    #[test]
    fn float_parses_text_cells() {
        assert_eq!(to_float(&Cell::Text("3.14".to_string())), Some(3.14));
        assert_eq!(to_float(&Cell::Text("".to_string())), None);
        assert_eq!(to_float(&Cell::Text("-".to_string())), None);
        assert_eq!(to_float(&Cell::Text("NaN".to_string())), None);
    }

    #[test]
    fn str_trims_and_rejects_empty() {
        assert_eq!(to_str(&Cell::Text("  贵州茅台  ".to_string())), Some("贵州茅台".to_string()));
        assert_eq!(to_str(&Cell::Text("   ".to_string())), None);
        assert_eq!(to_str(&Cell::Null), None);
    }
}
