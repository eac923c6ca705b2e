//! Fixed-column plain-text tables for run artifacts.

/// Render `rows` under `header` with every column padded to its widest cell.
pub(crate) fn render(header: &[&str], rows: &[Vec<String>]) -> String {
    let cols = header.len();
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(cols) {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let sep: String = {
        let mut s = String::from("*");
        for w in &widths {
            s.push_str(&"-".repeat(w + 2));
            s.push('*');
        }
        s.push('\n');
        s
    };

    let mut out = String::new();
    out.push_str(&sep);
    out.push('|');
    for (i, h) in header.iter().enumerate() {
        out.push_str(&format!(" {:^width$} |", h, width = widths[i]));
    }
    out.push('\n');
    out.push_str(&sep);
    for row in rows {
        out.push('|');
        for (i, cell) in row.iter().enumerate().take(cols) {
            out.push_str(&format!(" {:^width$} |", cell, width = widths[i]));
        }
        out.push('\n');
    }
    out.push_str(&sep);
    out
}

#[cfg(test)]
mod tests {
    use super::render;

    #[test]
    fn columns_align_to_widest_cell() {
        let out = render(
            &["METRIC", "VALUE"],
            &[
                vec!["success-total".to_string(), "10".to_string()],
                vec!["p50".to_string(), "1.25ms".to_string()],
            ],
        );
        let lines: Vec<&str> = out.lines().collect();
        // every rendered line has equal width
        let w = lines[0].len();
        assert!(lines.iter().all(|l| l.len() == w), "{out}");
        assert!(out.contains("success-total"));
    }
}
