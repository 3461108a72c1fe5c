use std::ffi::{OsStr, OsString};
use std::path::Path;

use crate::encoder::types::{ConversionOptions, FormatOptions};
use crate::error::OptionError;

const MP4_PIXEL_FORMAT: &str = "yuv420p";
const GIF_SCALE_FLAGS: &str = "flags=lanczos";
const GIF_PALETTE_GRAPH: &str =
    "split [a][b]; [a] palettegen=stats_mode=full [p]; [b][p] paletteuse=dither=floyd_steinberg";

/// Builds encoder argument vectors
///
/// The result does not include the executable; the caller decides which
/// encoder binary to run.
pub struct CommandBuilder;

impl CommandBuilder {
    /// Arguments reading `pattern` at the configured frame rate and writing `output`
    ///
    /// Existing output is always overwritten.
    pub fn build(
        pattern: &Path,
        options: &ConversionOptions,
        output: &Path,
    ) -> Result<Vec<OsString>, OptionError> {
        options.validate()?;

        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-framerate".into(),
            options.frame_rate.to_string().into(),
            "-i".into(),
            pattern.as_os_str().to_owned(),
        ];

        match &options.format {
            FormatOptions::Mp4 { codec, crf } => {
                args.extend(
                    ["-c:v", codec.as_str(), "-crf", &crf.to_string(), "-pix_fmt", MP4_PIXEL_FORMAT]
                        .into_iter()
                        .map(OsString::from),
                );
            }
            FormatOptions::Gif { scale_width } => {
                args.push("-vf".into());
                args.push(Self::gif_filter(*scale_width).into());
            }
        }

        args.push(output.as_os_str().to_owned());
        Ok(args)
    }

    /// Filter graph for palette-based GIF output, optionally rescaled first
    pub fn gif_filter(scale_width: Option<u32>) -> String {
        match scale_width {
            Some(width) => format!("scale={width}:-1:{GIF_SCALE_FLAGS},{GIF_PALETTE_GRAPH}"),
            None => GIF_PALETTE_GRAPH.to_string(),
        }
    }
}

/// Render a command line for logs, quoting arguments that contain spaces
pub fn render_command_line(program: &OsStr, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|arg| {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossy(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_mp4_arguments() {
        let options = ConversionOptions::mp4(25, "libx264", 18);
        let args = CommandBuilder::build(
            Path::new("/tmp/work/img%04d.png"),
            &options,
            Path::new("out.mp4"),
        )
        .unwrap();

        assert_eq!(
            lossy(&args),
            vec![
                "-y", "-framerate", "25", "-i", "/tmp/work/img%04d.png", "-c:v", "libx264",
                "-crf", "18", "-pix_fmt", "yuv420p", "out.mp4",
            ]
        );
    }

    #[test]
    fn test_gif_with_scale() {
        let options = ConversionOptions::gif(12, Some(480));
        let args = lossy(
            &CommandBuilder::build(Path::new("img%04d.png"), &options, Path::new("out.gif")).unwrap(),
        );

        assert_eq!(&args[..5], &["-y", "-framerate", "12", "-i", "img%04d.png"]);
        assert_eq!(args[5], "-vf");
        assert!(args[6].starts_with("scale=480:-1:flags=lanczos,split"));
        assert!(args[6].contains("palettegen=stats_mode=full"));
        assert!(args[6].ends_with("paletteuse=dither=floyd_steinberg"));
        assert_eq!(args[7], "out.gif");
        assert_eq!(args.len(), 8);
    }

    #[test]
    fn test_gif_without_scale() {
        let filter = CommandBuilder::gif_filter(None);
        assert!(filter.starts_with("split"));
        assert!(!filter.contains("scale="));
    }

    #[test]
    fn test_build_is_deterministic() {
        let options = ConversionOptions::gif(10, Some(320));
        let pattern = Path::new("w/img%04d.jpg");
        let output = Path::new("o.gif");
        assert_eq!(
            CommandBuilder::build(pattern, &options, output).unwrap(),
            CommandBuilder::build(pattern, &options, output).unwrap()
        );
    }

    #[test]
    fn test_invalid_options_rejected() {
        let pattern = Path::new("img%04d.png");
        let output = Path::new("out.mp4");
        assert!(CommandBuilder::build(pattern, &ConversionOptions::mp4(25, "libx264", 99), output).is_err());
        assert!(CommandBuilder::build(pattern, &ConversionOptions::mp4(0, "libx264", 18), output).is_err());
        assert!(CommandBuilder::build(pattern, &ConversionOptions::gif(25, Some(0)), output).is_err());
    }

    #[test]
    fn test_render_command_line_quotes_spaces() {
        let rendered = render_command_line(
            OsStr::new("ffmpeg"),
            &["-i".into(), "my frames/img%04d.png".into(), "out.mp4".into()],
        );
        assert_eq!(rendered, "ffmpeg -i \"my frames/img%04d.png\" out.mp4");
    }
}
