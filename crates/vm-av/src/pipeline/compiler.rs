//! Compile [`TransformParams`] into a [`TransformPlan`].
//!
//! The filter order is fixed: speed, analysis crop/hue, colour filters,
//! watermark, aspect scale for video; tempo, sample rate, echo for audio.
//! Randomised values are drawn from the caller's RNG in that same order, so
//! a seeded RNG reproduces the plan exactly. Production callers use
//! [`PipelineCompiler::compile`], which draws from the thread-local entropy
//! source; identical inputs then yield different plans on purpose.

use std::path::{Path, PathBuf};

use rand::Rng;
use vm_core::config::EncodingConfig;
use vm_core::{Error, Result, TransformParams};

use super::plan::{AudioFilter, EncodingOptions, InputTrim, TransformPlan, VideoFilter};

/// Opacity levels a watermark may be drawn with.
const WATERMARK_ALPHAS: [f64; 4] = [0.3, 0.4, 0.5, 0.6];

const ECHO_IN_GAIN: f64 = 0.8;
const ECHO_OUT_GAIN: f64 = 0.9;

/// Facts about the source file that some filters depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMedia {
    pub path: PathBuf,
    /// Height of the primary video stream. Required when `aspect` is set.
    pub height: Option<u32>,
}

impl SourceMedia {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            height: None,
        }
    }

    pub fn with_height(mut self, height: Option<u32>) -> Self {
        self.height = height;
        self
    }
}

/// Builds transformation plans with configured encoding defaults.
#[derive(Debug, Clone)]
pub struct PipelineCompiler {
    encoding: EncodingOptions,
    base_sample_rate: u32,
    watermark_text: String,
}

impl Default for PipelineCompiler {
    fn default() -> Self {
        Self::new(&EncodingConfig::default())
    }
}

impl PipelineCompiler {
    pub fn new(config: &EncodingConfig) -> Self {
        Self {
            encoding: EncodingOptions::from(config),
            base_sample_rate: config.base_sample_rate,
            watermark_text: sanitize_overlay_text(&config.watermark_text),
        }
    }

    /// Compile using the thread-local entropy source.
    pub fn compile(
        &self,
        params: &TransformParams,
        source: &SourceMedia,
        output: &Path,
    ) -> Result<TransformPlan> {
        self.compile_with_rng(params, source, output, &mut rand::thread_rng())
    }

    /// Compile drawing every randomised value from `rng`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if speed or pitch is not a finite number
    /// above zero, or if `aspect` is requested without a known source height.
    pub fn compile_with_rng<R: Rng + ?Sized>(
        &self,
        params: &TransformParams,
        source: &SourceMedia,
        output: &Path,
        rng: &mut R,
    ) -> Result<TransformPlan> {
        params.validate()?;
        let toggles = params.toggles;

        let source_height = if toggles.aspect {
            match source.height {
                Some(h) if h > 0 => Some(h),
                _ => {
                    return Err(Error::invalid_parameter(
                        "aspect requires the source video height; probe the input first",
                    ))
                }
            }
        } else {
            None
        };

        let mut video = vec![VideoFilter::Speed {
            factor: 1.0 / params.speed,
        }];
        let mut trim = None;

        if toggles.any_analysis() {
            video.push(VideoFilter::Crop {
                trim_width: rng.gen_range(0..50),
                trim_height: rng.gen_range(0..50),
            });
            video.push(VideoFilter::Hue {
                degrees: rng.gen_range(-10..10),
                saturation: rng.gen_range(0.9..1.1),
            });

            if toggles.random_cuts {
                trim = Some(InputTrim {
                    start_offset_secs: rng.gen_range(0..5),
                    duration_secs: rng.gen_range(10..40),
                });
            }
        }

        if toggles.filters {
            video.push(VideoFilter::ChannelMixer {
                red: rng.gen_range(0.8..1.2),
                green: rng.gen_range(0.8..1.2),
                blue: rng.gen_range(0.8..1.2),
            });
            video.push(VideoFilter::Equalizer {
                contrast: rng.gen_range(1.0..1.3),
                brightness: rng.gen_range(-0.05..0.05),
            });
        }

        if toggles.watermark {
            video.push(VideoFilter::TextOverlay {
                text: self.watermark_text.clone(),
                x: rng.gen_range(10..60),
                y_from_bottom: rng.gen_range(10..60),
                font_size: rng.gen_range(20..35),
                alpha: WATERMARK_ALPHAS[rng.gen_range(0..WATERMARK_ALPHAS.len())],
            });
        }

        if let Some(height) = source_height {
            let factor: f64 = rng.gen_range(0.8..1.2);
            video.push(VideoFilter::Scale {
                height: even_floor((f64::from(height) * factor) as u32),
            });
        }

        let mut audio = vec![
            AudioFilter::Tempo {
                speed: params.speed,
            },
            AudioFilter::SampleRate {
                base_rate: self.base_sample_rate,
                pitch: params.pitch,
            },
        ];

        if toggles.audio_mix {
            audio.push(AudioFilter::Echo {
                in_gain: ECHO_IN_GAIN,
                out_gain: ECHO_OUT_GAIN,
                delay_ms: rng.gen_range(500..1500),
                decay: rng.gen_range(0.4..0.7),
            });
        }

        Ok(TransformPlan {
            input: source.path.clone(),
            output: output.to_path_buf(),
            trim,
            video,
            audio,
            encoding: self.encoding.clone(),
        })
    }
}

/// Round down to an even pixel count; 4:2:0 encoders reject odd sizes.
fn even_floor(v: u32) -> u32 {
    (v & !1).max(2)
}

/// Keep characters that need no escaping inside a drawtext filter option.
fn sanitize_overlay_text(text: &str) -> String {
    text.chars()
        .filter(|c| {
            c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | '!' | '?' | '@' | '#')
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use vm_core::FeatureToggles;

    fn source() -> SourceMedia {
        SourceMedia::new("/tmp/input.mp4").with_height(Some(1080))
    }

    fn all_toggles() -> FeatureToggles {
        FeatureToggles {
            watermark: true,
            filters: true,
            aspect: true,
            random_cuts: true,
            audio_mix: true,
            ai_detection: true,
            auto_edit: true,
            content_analysis: true,
        }
    }

    fn compile_seeded(params: &TransformParams, seed: u64) -> TransformPlan {
        let mut rng = StdRng::seed_from_u64(seed);
        PipelineCompiler::default()
            .compile_with_rng(params, &source(), Path::new("/tmp/out.mp4"), &mut rng)
            .unwrap()
    }

    #[test]
    fn identity_params_produce_minimal_chains() {
        let plan = compile_seeded(&TransformParams::new(1.0, 1.0), 1);
        assert_eq!(plan.video_descriptors(), vec!["setpts=1.0*PTS"]);
        assert_eq!(plan.audio_descriptors(), vec!["atempo=1.0", "asetrate=44100*1.0"]);
        assert!(plan.trim().is_none());
        assert_eq!(plan.input(), Path::new("/tmp/input.mp4"));
        assert_eq!(plan.output(), Path::new("/tmp/out.mp4"));
    }

    #[test]
    fn speed_filter_uses_reciprocal() {
        let plan = compile_seeded(&TransformParams::new(2.0, 1.5), 1);
        assert_eq!(plan.video_descriptors()[0], "setpts=0.5*PTS");
        assert_eq!(plan.audio_descriptors(), vec!["atempo=2.0", "asetrate=44100*1.5"]);
    }

    #[test]
    fn speed_filter_always_first() {
        for seed in 0..20 {
            let params = TransformParams::new(1.3, 0.8).with_toggles(all_toggles());
            let plan = compile_seeded(&params, seed);
            assert!(matches!(plan.video_filters()[0], VideoFilter::Speed { .. }));
        }
    }

    #[test]
    fn audio_chain_has_echo_only_with_audio_mix() {
        let plan = compile_seeded(&TransformParams::new(1.0, 1.0), 3);
        assert_eq!(plan.audio_filters().len(), 2);

        let toggles = FeatureToggles {
            audio_mix: true,
            ..Default::default()
        };
        let plan = compile_seeded(&TransformParams::new(1.0, 1.0).with_toggles(toggles), 3);
        assert_eq!(plan.audio_filters().len(), 3);
        assert!(plan.audio_descriptors()[2].starts_with("aecho=0.8:0.9:"));
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let params = TransformParams::new(1.1, 0.95).with_toggles(all_toggles());
        assert_eq!(compile_seeded(&params, 42), compile_seeded(&params, 42));
    }

    #[test]
    fn full_toggle_order() {
        let params = TransformParams::new(1.0, 1.0).with_toggles(all_toggles());
        let plan = compile_seeded(&params, 7);
        let kinds: Vec<&str> = plan
            .video_descriptors()
            .iter()
            .map(|d| match d.split('=').next().unwrap() {
                "setpts" => "speed",
                "crop" => "crop",
                "hue" => "hue",
                "colorchannelmixer" => "mixer",
                "eq" => "eq",
                "drawtext" => "text",
                "scale" => "scale",
                other => panic!("unexpected filter {other}"),
            })
            .collect();
        assert_eq!(kinds, ["speed", "crop", "hue", "mixer", "eq", "text", "scale"]);
        assert!(plan.trim().is_some());
    }

    #[test]
    fn random_values_stay_in_range() {
        let params = TransformParams::new(1.0, 1.0).with_toggles(all_toggles());
        for seed in 0..200 {
            let plan = compile_seeded(&params, seed);
            for filter in plan.video_filters() {
                match *filter {
                    VideoFilter::Crop {
                        trim_width,
                        trim_height,
                    } => {
                        assert!(trim_width < 50 && trim_height < 50);
                    }
                    VideoFilter::Hue {
                        degrees,
                        saturation,
                    } => {
                        assert!((-10..10).contains(&degrees));
                        assert!((0.9..1.1).contains(&saturation));
                    }
                    VideoFilter::ChannelMixer { red, green, blue } => {
                        for v in [red, green, blue] {
                            assert!((0.8..1.2).contains(&v));
                        }
                    }
                    VideoFilter::Equalizer {
                        contrast,
                        brightness,
                    } => {
                        assert!((1.0..1.3).contains(&contrast));
                        assert!((-0.05..0.05).contains(&brightness));
                    }
                    VideoFilter::TextOverlay {
                        x,
                        y_from_bottom,
                        font_size,
                        alpha,
                        ..
                    } => {
                        assert!((10..60).contains(&x));
                        assert!((10..60).contains(&y_from_bottom));
                        assert!((20..35).contains(&font_size));
                        assert!(WATERMARK_ALPHAS.contains(&alpha));
                    }
                    VideoFilter::Scale { height } => {
                        assert!((862..=1296).contains(&height), "height {height}");
                        assert_eq!(height % 2, 0);
                    }
                    VideoFilter::Speed { .. } => {}
                }
            }
            let trim = plan.trim().unwrap();
            assert!(trim.start_offset_secs < 5);
            assert!((10..40).contains(&trim.duration_secs));
            match plan.audio_filters()[2] {
                AudioFilter::Echo {
                    delay_ms, decay, ..
                } => {
                    assert!((500..1500).contains(&delay_ms));
                    assert!((0.4..0.7).contains(&decay));
                }
                ref other => panic!("expected echo, got {other:?}"),
            }
        }
    }

    #[test]
    fn random_cuts_require_an_analysis_toggle() {
        let toggles = FeatureToggles {
            random_cuts: true,
            ..Default::default()
        };
        let plan = compile_seeded(&TransformParams::new(1.0, 1.0).with_toggles(toggles), 5);
        assert!(plan.trim().is_none());
        assert_eq!(plan.video_filters().len(), 1);
    }

    #[test]
    fn zero_speed_and_pitch_rejected() {
        let compiler = PipelineCompiler::default();
        let out = Path::new("/tmp/out.mp4");
        for params in [
            TransformParams::new(0.0, 1.0),
            TransformParams::new(1.0, 0.0),
            // 1/speed overflows to infinity.
            TransformParams::new(1e-310, 1.0),
        ] {
            let err = compiler.compile(&params, &source(), out).unwrap_err();
            assert!(matches!(err, Error::InvalidParameter(_)), "got {err}");
        }
    }

    #[test]
    fn aspect_without_height_rejected() {
        let toggles = FeatureToggles {
            aspect: true,
            ..Default::default()
        };
        let params = TransformParams::new(1.0, 1.0).with_toggles(toggles);
        let err = PipelineCompiler::default()
            .compile(&params, &SourceMedia::new("/tmp/in.mp4"), Path::new("/tmp/out.mp4"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(err.to_string().contains("height"));
    }

    #[test]
    fn encoding_and_text_follow_config() {
        let config = EncodingConfig {
            crf: 18,
            base_sample_rate: 48_000,
            watermark_text: "Hi: it's me".into(),
            ..Default::default()
        };
        let toggles = FeatureToggles {
            watermark: true,
            ..Default::default()
        };
        let params = TransformParams::new(1.0, 1.0).with_toggles(toggles);
        let mut rng = StdRng::seed_from_u64(9);
        let plan = PipelineCompiler::new(&config)
            .compile_with_rng(&params, &source(), Path::new("/tmp/o.mp4"), &mut rng)
            .unwrap();
        assert_eq!(plan.encoding().crf, 18);
        assert_eq!(plan.audio_descriptors()[1], "asetrate=48000*1.0");
        assert!(plan.video_descriptors()[1].starts_with("drawtext=text='Hi its me':"));
    }

    #[test]
    fn even_floor_values() {
        assert_eq!(even_floor(865), 864);
        assert_eq!(even_floor(864), 864);
        assert_eq!(even_floor(1), 2);
    }
}
