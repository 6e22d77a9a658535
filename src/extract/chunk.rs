//! Text cleanup and chunking

/// Splits text into overlapping chunks of at most `size` characters
///
/// A chunk boundary is moved back to the last whitespace inside the final
/// tenth of the window when one exists. Each following chunk starts
/// `overlap` characters before the previous boundary, and always at least one
/// character after the previous start.
///
/// Empty input yields no chunks; input no longer than `size` yields one.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let size = size.max(1);

    if total == 0 {
        return Vec::new();
    }
    if total <= size {
        let chunk = text.trim();
        return if chunk.is_empty() {
            Vec::new()
        } else {
            vec![chunk.to_string()]
        };
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let mut end = (start + size).min(total);

        if end < total {
            let window_floor = end - size / 10;
            if let Some(split) = (window_floor.max(start + 1)..end)
                .rev()
                .find(|&i| chars[i].is_whitespace())
            {
                end = split;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= total {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Collapses every run of whitespace into a single space
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes page-number lines left by PDF text extraction
///
/// Drops lines that consist only of `Page N`, `Page N of M`, `N of M` or a
/// bare number, then collapses whitespace.
pub fn clean_pdf_text(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_page_marker(line))
        .collect();
    collapse_whitespace(&kept.join(" "))
}

fn is_page_marker(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    let is_number = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    match words.as_slice() {
        [n] => is_number(n),
        [page, n] => page.eq_ignore_ascii_case("page") && is_number(n),
        [n, of, m] => is_number(n) && of.eq_ignore_ascii_case("of") && is_number(m),
        [page, n, of, m] => {
            page.eq_ignore_ascii_case("page")
                && is_number(n)
                && of.eq_ignore_ascii_case("of")
                && is_number(m)
        }
        _ => false,
    }
}
