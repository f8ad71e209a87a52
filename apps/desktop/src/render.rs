use shared::domain::{ConversationEntry, EntryKind};

const RESET: &str = "\x1b[0m";

/// Hue in degrees derived from the author's name: the sum of its UTF-16 code
/// units, modulo 360. Stable across runs and clients.
pub fn author_hue(author: &str) -> u16 {
    let sum: u64 = author.encode_utf16().map(u64::from).sum();
    (sum % 360) as u16
}

/// HSL with 50% saturation and 70% lightness, as RGB.
pub fn author_rgb(author: &str) -> (u8, u8, u8) {
    hsl_to_rgb(f64::from(author_hue(author)), 0.5, 0.7)
}

fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> (u8, u8, u8) {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u8 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (channel(r), channel(g), channel(b))
}

pub fn colored_author(author: &str) -> String {
    let (r, g, b) = author_rgb(author);
    format!("\x1b[38;2;{r};{g};{b}m{author}{RESET}")
}

/// One log line, numbered from 1 the way `/select` and `/download` expect.
pub fn render_entry(position: usize, entry: &ConversationEntry) -> String {
    let mut line = format!(
        "#{} [{}] {}: {}",
        position + 1,
        entry.timestamp(),
        colored_author(entry.author()),
        entry.body()
    );
    match (entry.kind(), entry.transfer_ref()) {
        (EntryKind::ImageTransfer, Some(transfer)) => {
            if let Some(locator) = &transfer.resource_locator {
                line.push_str(&format!(" <{locator}>"));
            }
        }
        (EntryKind::FileTransfer, Some(_)) => line.push_str(" (use /download)"),
        _ => {}
    }
    line
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
