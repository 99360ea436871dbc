//! Frame count introspection.

use std::sync::OnceLock;

use regex::Regex;

use crate::command::{GifsicleCommand, GifsicleRunner};
use crate::error::MediaResult;

fn num_frames_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?P<num_frames>\d+) images").expect("valid regex"))
}

/// Extract the frame count from `gifsicle -I` output.
///
/// gifsicle reports multi-frame inputs as `* <stdin> 8 images`. The first match wins.
/// Returns `None` when the output has no `<N> images` phrase (single-frame gifs are
/// reported as `1 image` and therefore also yield `None`).
pub fn parse_frame_count(info_output: &str) -> Option<u32> {
    num_frames_pattern()
        .captures(info_output)
        .and_then(|caps| caps.name("num_frames"))
        .and_then(|m| m.as_str().parse().ok())
}

/// Ask gifsicle how many frames a gif has.
pub async fn frame_count(runner: &GifsicleRunner, image: &[u8]) -> MediaResult<Option<u32>> {
    let stdout = runner.run(&GifsicleCommand::info(), image).await?;
    Ok(parse_frame_count(&String::from_utf8_lossy(&stdout)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_OUTPUT: &str = "* <stdin> 12 images
  logical screen 480x270
  global color table [256]
  background 0
  loop forever
  + image #0 480x270 transparent 255
    disposal asis delay 0.04s
";

    #[test]
    fn test_parse_frame_count() {
        assert_eq!(parse_frame_count(INFO_OUTPUT), Some(12));
    }

    #[test]
    fn test_parse_frame_count_first_match_wins() {
        assert_eq!(parse_frame_count("3 images then 7 images"), Some(3));
    }

    #[test]
    fn test_parse_frame_count_missing() {
        assert_eq!(parse_frame_count(""), None);
        assert_eq!(parse_frame_count("* <stdin> 1 image\n"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_without_pattern() {
        // `true` exits 0 and prints nothing.
        let runner = GifsicleRunner::with_binary("true");
        assert_eq!(frame_count(&runner, b"GIF89a").await.unwrap(), None);
    }
}
