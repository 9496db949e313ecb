//! Startup banner: "TUTOR-CRM" in FIGlet letters with a vertical color gradient.

use crossterm::ExecutableCommand;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use figlet_rs::FIGfont;
use std::io::{Write, stdout};

/// Chalkboard green (#2e8b57).
const BOARD_GREEN: (u8, u8, u8) = (0x2e, 0x8b, 0x57);
/// Chalk yellow (#f4e04d).
const CHALK_YELLOW: (u8, u8, u8) = (0xf4, 0xe0, 0x4d);

const TITLE: &str = "TUTOR-CRM";

/// Linear interpolation between two RGB colors. `t` in [0.0, 1.0].
fn lerp_rgb(a: (u8, u8, u8), b: (u8, u8, u8), t: f64) -> (u8, u8, u8) {
    let r = (f64::from(a.0) * (1.0 - t) + f64::from(b.0) * t).round() as u8;
    let g = (f64::from(a.1) * (1.0 - t) + f64::from(b.1) * t).round() as u8;
    let bl = (f64::from(a.2) * (1.0 - t) + f64::from(b.2) * t).round() as u8;
    (r, g, bl)
}

/// Banner lines. Falls back to the plain title when the built-in font cannot render.
fn banner_lines() -> Vec<String> {
    FIGfont::standard()
        .ok()
        .and_then(|font| {
            let figure = font.convert(TITLE)?;
            Some(figure.to_string().lines().map(str::to_string).collect::<Vec<_>>())
        })
        .unwrap_or_else(|| vec![TITLE.to_string()])
}

pub fn print_welcome() {
    let mut out = stdout();
    let lines = banner_lines();
    let total = lines.len().max(1);

    for (i, line) in lines.iter().enumerate() {
        let t = if total <= 1 {
            1.0
        } else {
            i as f64 / (total - 1) as f64
        };
        let (r, g, b) = lerp_rgb(BOARD_GREEN, CHALK_YELLOW, t);
        let _ = out.execute(SetForegroundColor(Color::Rgb { r, g, b }));
        let _ = out.execute(Print(line));
        let _ = out.execute(Print("\r\n"));
        let _ = out.execute(ResetColor);
    }

    let version = env!("CARGO_PKG_VERSION");
    let _ = out.execute(SetForegroundColor(Color::Rgb {
        r: CHALK_YELLOW.0,
        g: CHALK_YELLOW.1,
        b: CHALK_YELLOW.2,
    }));
    let _ = out.execute(Print(format!("v{version}\r\n")));
    let _ = out.execute(Print("Учебный центр: ученики, курсы, посещаемость\r\n"));
    let _ = out.execute(ResetColor);
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_endpoints() {
        assert_eq!(lerp_rgb(BOARD_GREEN, CHALK_YELLOW, 0.0), BOARD_GREEN);
        assert_eq!(lerp_rgb(BOARD_GREEN, CHALK_YELLOW, 1.0), CHALK_YELLOW);
    }

    #[test]
    fn banner_is_not_empty() {
        assert!(banner_lines().iter().any(|l| !l.trim().is_empty()));
    }

    #[test]
    fn standard_font_renders_multiline_figure() {
        let lines = banner_lines();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l != TITLE));
    }
}
