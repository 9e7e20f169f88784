use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// DejaVu Mono ships in the container image; local dev falls back to
// fontconfig lookup.
const CONTAINER_FONT: &str = "/usr/share/fonts/dejavu/DejaVuSansMono.ttf";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorGrade {
    Green,
    Gray,
    Blue,
    Sepia,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputQuality {
    Low,
    Medium,
    High,
}

impl OutputQuality {
    pub fn crf(self) -> u8 {
        match self {
            OutputQuality::Low => 28,
            OutputQuality::Medium => 23,
            OutputQuality::High => 18,
        }
    }
}

/// Toggleable body-cam effect parameters. Fields are independent; each one
/// contributes at most one stage to the filter chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoEffects {
    pub scanlines: bool,
    pub timestamp: bool,
    pub facility_id: String,
    pub vignette: bool,
    pub vignette_intensity: f64,
    pub color_grade: ColorGrade,
    pub noise: bool,
    pub noise_intensity: f64,
    pub rec_indicator: bool,
    pub camera_shake: bool,
    pub shake_intensity: f64,
    pub output_quality: OutputQuality,
}

impl Default for VideoEffects {
    fn default() -> Self {
        Self {
            scanlines: true,
            timestamp: true,
            facility_id: "CAM-07 // SITE-19".to_string(),
            vignette: true,
            vignette_intensity: 0.5,
            color_grade: ColorGrade::Green,
            noise: true,
            noise_intensity: 0.3,
            rec_indicator: true,
            camera_shake: false,
            shake_intensity: 0.2,
            output_quality: OutputQuality::Medium,
        }
    }
}

#[derive(Debug, Error)]
pub enum EffectsError {
    #[error("{field} must be between 0.0 and 1.0 (got {value})")]
    IntensityOutOfRange { field: &'static str, value: f64 },
}

impl VideoEffects {
    pub fn validate(&self) -> Result<(), EffectsError> {
        for (field, value) in [
            ("noiseIntensity", self.noise_intensity),
            ("vignetteIntensity", self.vignette_intensity),
            ("shakeIntensity", self.shake_intensity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EffectsError::IntensityOutOfRange { field, value });
            }
        }
        Ok(())
    }
}

/// Quotes and colons are structural in ffmpeg filter descriptions.
fn escape_text(text: &str) -> String {
    text.replace('\'', "\\'").replace(':', "\\:")
}

fn font_spec() -> String {
    if Path::new(CONTAINER_FONT).exists() {
        format!("fontfile={}", CONTAINER_FONT)
    } else {
        "font=Courier".to_string()
    }
}

/// Compile an effects configuration into an ffmpeg -vf chain. Stage order is
/// fixed (noise, color grade, vignette, camera shake, scanlines, facility id,
/// timestamp, REC indicator) because later stages composite over earlier
/// ones. Disabled toggles contribute nothing; all-off compiles to "".
pub fn build_filter_chain(effects: &VideoEffects) -> String {
    build_chain(effects, &font_spec())
}

fn build_chain(effects: &VideoEffects, font: &str) -> String {
    let mut filters: Vec<String> = Vec::new();

    // 1. Noise
    if effects.noise {
        let strength = (effects.noise_intensity * 60.0).round() as u32;
        filters.push(format!("noise=alls={}:allf=t", strength));
    }

    // 2. Color grading
    match effects.color_grade {
        ColorGrade::Green => {
            filters.push("colorchannelmixer=.3:.4:.3:0:.3:.4:.3:0:.3:.4:.3:0".to_string());
        }
        ColorGrade::Gray => {
            filters.push("colorchannelmixer=.33:.33:.33:0:.33:.33:.33:0:.33:.33:.33:0".to_string());
        }
        ColorGrade::Blue => {
            filters.push("colorchannelmixer=.2:.2:.4:0:.2:.2:.4:0:.2:.2:.6:0".to_string());
        }
        ColorGrade::Sepia => {
            filters.push(
                "colorchannelmixer=.393:.769:.189:0:.349:.686:.168:0:.272:.534:.131:0".to_string(),
            );
        }
        ColorGrade::None => {}
    }

    // 3. Vignette
    if effects.vignette {
        let angle = effects.vignette_intensity * std::f64::consts::PI / 2.0;
        filters.push(format!("vignette=angle={:.4}", angle));
    }

    // 4. Camera shake
    if effects.camera_shake {
        let amp = (effects.shake_intensity * 20.0).round() as u32 + 2;
        filters.push(format!(
            "crop=iw-{}:ih-{}:{}*sin(t*10):{}*cos(t*8)",
            amp * 2,
            amp * 2,
            amp,
            amp
        ));
    }

    // 5. Scanlines (darken every other line)
    if effects.scanlines {
        filters.push(
            "geq=lum='if(mod(Y\\,2)\\,lum(X\\,Y)*0.85\\,lum(X\\,Y))':cb='cb(X\\,Y)':cr='cr(X\\,Y)'"
                .to_string(),
        );
    }

    // 6. Facility ID
    if !effects.facility_id.is_empty() {
        filters.push(format!(
            "drawtext=text='{}':x=20:y=20:fontsize=18:fontcolor=white@0.7:{}:borderw=1:bordercolor=black@0.5",
            escape_text(&effects.facility_id),
            font
        ));
    }

    // 7. Timestamp
    if effects.timestamp {
        filters.push(format!(
            "drawtext=text='%{{pts\\:hms}}':x=w-200:y=20:fontsize=18:fontcolor=white@0.7:{}:borderw=1:bordercolor=black@0.5",
            font
        ));
    }

    // 8. REC indicator (blinking text plus the dot)
    if effects.rec_indicator {
        filters.push(format!(
            "drawtext=text='REC':x=20:y=h-40:fontsize=16:fontcolor=red@0.9:{}:borderw=1:bordercolor=black@0.5:enable='lt(mod(t\\,2)\\,1.5)'",
            font
        ));
        filters.push(
            "drawbox=x=56:y=h-38:w=8:h=8:color=red@0.9:t=fill:enable='lt(mod(t\\,2)\\,1.5)'"
                .to_string(),
        );
    }

    filters.join(",")
}
