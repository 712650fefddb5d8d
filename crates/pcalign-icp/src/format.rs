use crate::transform::RigidTransform;

const DECIMALS: usize = 6;

/// Format a value with 6 decimals, printing values that round to zero as
/// `0.000000` without a minus sign.
pub fn format_value(value: f64) -> String {
    let s = format!("{value:.DECIMALS$}");
    let is_zero = s
        .trim_start_matches('-')
        .chars()
        .all(|c| c == '0' || c == '.');
    match is_zero {
        true => format!("{:.DECIMALS$}", 0.0),
        false => s,
    }
}

// right aligned cells of a common width, separated by a space
fn format_rows(rows: &[Vec<String>], width: usize) -> Vec<String> {
    rows.iter()
        .map(|row| {
            let cells = row
                .iter()
                .map(|cell| format!("{cell:>width$}"))
                .collect::<Vec<_>>();
            format!("[{}]", cells.join(" "))
        })
        .collect()
}

fn max_width(rows: &[Vec<String>]) -> usize {
    let width = rows.iter().flatten().map(|s| s.len()).max().unwrap_or(0);
    // room for a sign in front of positive values when any value is negative
    let any_negative = rows.iter().flatten().any(|s| s.starts_with('-'));
    match any_negative {
        true => width,
        false => width + 1,
    }
}

/// Format a row-major matrix in a numpy-like layout.
///
/// ```
/// use pcalign_icp::format::format_matrix;
///
/// let s = format_matrix(&[[1.0, 0.0], [0.0, -1.0]]);
/// assert_eq!(s, "[[ 1.000000  0.000000]\n [ 0.000000 -1.000000]]");
/// ```
pub fn format_matrix<const R: usize, const C: usize>(m: &[[f64; C]; R]) -> String {
    let rows = m
        .iter()
        .map(|row| row.iter().map(|v| format_value(*v)).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let lines = format_rows(&rows, max_width(&rows));
    format!("[{}]", lines.join("\n "))
}

/// Format a vector in a numpy-like layout.
pub fn format_vector<const N: usize>(v: &[f64; N]) -> String {
    let rows = vec![v.iter().map(|x| format_value(*x)).collect::<Vec<_>>()];
    let width = max_width(&rows);
    format_rows(&rows, width).concat()
}

/// Format the rotation and the translation of a transform, plus the scale
/// when `with_scale` is set.
pub fn format_transform(transform: &RigidTransform, with_scale: bool) -> String {
    let mut out = format!(
        "R =\n{}\nt =\n{}",
        format_matrix(&transform.rotation),
        format_vector(&transform.translation)
    );
    if with_scale {
        out.push_str(&format!("\ns = {}", format_value(transform.scale)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1.0), "1.000000");
        assert_eq!(format_value(-0.5), "-0.500000");
        assert_eq!(format_value(1.23456789), "1.234568");
        assert_eq!(format_value(-0.0), "0.000000");
        assert_eq!(format_value(-1e-9), "0.000000");
        assert_eq!(format_value(4e-7), "0.000000");
        assert_eq!(format_value(-2e-6), "-0.000002");
    }

    #[test]
    fn test_format_identity() {
        let s = format_matrix(&RigidTransform::identity().rotation);
        assert_eq!(
            s,
            "[[ 1.000000  0.000000  0.000000]\n [ 0.000000  1.000000  0.000000]\n [ 0.000000  0.000000  1.000000]]"
        );
    }

    #[test]
    fn test_format_mixed_widths() {
        let s = format_matrix(&[[10.5, -1e-12], [-2.0, 0.25]]);
        assert_eq!(s, "[[10.500000  0.000000]\n [-2.000000  0.250000]]");
        assert_eq!(format_vector(&[0.1, -0.2, 0.3]), "[ 0.100000 -0.200000  0.300000]");
        assert_eq!(format_vector(&[1.0, 2.0]), "[ 1.000000  2.000000]");
    }

    #[test]
    fn test_format_transform() {
        let t = RigidTransform {
            translation: [1.0, -0.0, 2.0],
            scale: 2.0,
            ..Default::default()
        };
        let s = format_transform(&t, true);
        assert!(s.starts_with("R =\n[[ 1.000000"));
        assert!(s.contains("t =\n[ 1.000000  0.000000  2.000000]"));
        assert!(s.ends_with("s = 2.000000"));
        assert!(!format_transform(&t, false).contains("s ="));
    }
}
