//! FFmpeg filter graph construction.

use std::path::Path;

use ytclip_models::encoding::{
    CAPTION_FONT_COLOR, CAPTION_FONT_SIZE, CAPTION_SHADOW_OFFSET, CAPTION_TOP_OFFSET,
};
use ytclip_models::{OUTPUT_HEIGHT, OUTPUT_WIDTH};

/// Where drawtext reads the caption from.
#[derive(Debug, Clone, Copy)]
pub enum CaptionSource<'a> {
    /// Caption interpolated into the filter expression, escaped.
    Inline(&'a str),
    /// Caption read from a file; only the path enters the filter expression.
    TextFile(&'a Path),
}

/// Escape characters that are significant in filter option values.
///
/// Backslash is escaped first so that existing backslashes cannot pair with
/// the ones added for `:`, `'` and `"`.
pub fn escape_filter_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if matches!(c, '\\' | ':' | '\'' | '"') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Scale to fill the portrait frame height with Lanczos, fit inside the frame,
/// then pad to the exact frame size, centered.
pub fn portrait_fit_filter() -> String {
    let (w, h) = (OUTPUT_WIDTH, OUTPUT_HEIGHT);
    format!(
        "scale=-1:{h}:flags=lanczos,\
         scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:({w}-iw)/2:({h}-ih)/2"
    )
}

/// Centered caption near the top of the frame, with drop shadow.
pub fn caption_filter(caption: CaptionSource<'_>) -> String {
    let text = match caption {
        CaptionSource::Inline(text) => format!("text='{}'", escape_filter_text(text)),
        CaptionSource::TextFile(path) => {
            format!("textfile='{}'", escape_filter_text(&path.to_string_lossy()))
        }
    };
    format!(
        "drawtext={text}:fontcolor={CAPTION_FONT_COLOR}:fontsize={CAPTION_FONT_SIZE}:\
         x=(w-text_w)/2:y={CAPTION_TOP_OFFSET}:\
         shadowx={CAPTION_SHADOW_OFFSET}:shadowy={CAPTION_SHADOW_OFFSET}"
    )
}

/// Full render filter: portrait fit followed by the title caption.
pub fn portrait_caption_filter(caption: CaptionSource<'_>) -> String {
    format!("{},{}", portrait_fit_filter(), caption_filter(caption))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filter_text() {
        assert_eq!(escape_filter_text("Hi: there"), "Hi\\: there");
        assert_eq!(escape_filter_text("it's \"quoted\""), "it\\'s \\\"quoted\\\"");
        assert_eq!(escape_filter_text("a\\b"), "a\\\\b");
        assert_eq!(escape_filter_text("plain"), "plain");
    }

    #[test]
    fn test_every_special_char_is_preceded_by_backslash() {
        let escaped = escape_filter_text("a:b'c\"d");
        let chars: Vec<char> = escaped.chars().collect();
        for (i, c) in chars.iter().enumerate() {
            if matches!(c, ':' | '\'' | '"') {
                assert!(i > 0 && chars[i - 1] == '\\', "unescaped {c} in {escaped}");
            }
        }
    }

    #[test]
    fn test_portrait_caption_filter() {
        let filter = portrait_caption_filter(CaptionSource::Inline("Hi: there"));
        assert_eq!(
            filter,
            "scale=-1:1920:flags=lanczos,\
             scale=1080:1920:force_original_aspect_ratio=decrease,\
             pad=1080:1920:(1080-iw)/2:(1920-ih)/2,\
             drawtext=text='Hi\\: there':fontcolor=white:fontsize=64:\
             x=(w-text_w)/2:y=50:shadowx=2:shadowy=2"
        );
    }

    #[test]
    fn test_quote_in_title_stays_inside_text_option() {
        let filter = caption_filter(CaptionSource::Inline("it's"));
        assert!(filter.starts_with("drawtext=text='it\\'s':fontcolor=white"));
    }

    #[test]
    fn test_textfile_caption() {
        let filter = caption_filter(CaptionSource::TextFile(Path::new("/tmp/ytclip-a/caption.txt")));
        assert!(filter.starts_with("drawtext=textfile='/tmp/ytclip-a/caption.txt':"));
    }
}
