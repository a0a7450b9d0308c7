//! Mapping from the user-selected quality level to concrete RFB
//! encoding parameters.

use serde::Serialize;

use super::types::VncQuality;

const LOSSLESS_ENCODINGS: &str = "zrle ultra copyrect hextile zlib corre rre raw";
const LOSSY_ENCODINGS: &str = "tight zywrle zrle ultra";

/// Encoding parameters programmed into the codec for a quality level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingProfile {
    /// Space-separated encoding names, in preference order.
    pub encodings: &'static str,
    pub compress_level: u8,
    pub quality_level: u8,
    pub jpeg_enabled: bool,
}

impl EncodingProfile {
    /// Pure map; `Highest` selects lossless encodings and disables JPEG,
    /// everything else trades fidelity for bandwidth.
    pub fn for_quality(quality: VncQuality) -> Self {
        Self {
            encodings: if quality == VncQuality::Highest {
                LOSSLESS_ENCODINGS
            } else {
                LOSSY_ENCODINGS
            },
            compress_level: 9,
            quality_level: match quality {
                VncQuality::Highest => 9,
                VncQuality::High => 7,
                VncQuality::Medium => 5,
                VncQuality::Low => 3,
                VncQuality::Lowest => 0,
            },
            jpeg_enabled: quality != VncQuality::Highest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [VncQuality; 5] = [
        VncQuality::Highest,
        VncQuality::High,
        VncQuality::Medium,
        VncQuality::Low,
        VncQuality::Lowest,
    ];

    #[test]
    fn jpeg_disabled_only_for_highest() {
        for quality in ALL {
            let profile = EncodingProfile::for_quality(quality);
            assert_eq!(profile.jpeg_enabled, quality != VncQuality::Highest);
        }
    }

    #[test]
    fn compress_level_is_always_max() {
        for quality in ALL {
            assert_eq!(EncodingProfile::for_quality(quality).compress_level, 9);
        }
    }

    #[test]
    fn quality_levels_step_down() {
        let levels: Vec<u8> = ALL
            .iter()
            .map(|q| EncodingProfile::for_quality(*q).quality_level)
            .collect();
        assert_eq!(levels, vec![9, 7, 5, 3, 0]);
    }

    #[test]
    fn highest_prefers_lossless_encodings() {
        let highest = EncodingProfile::for_quality(VncQuality::Highest);
        assert!(highest.encodings.starts_with("zrle"));
        assert!(!highest.encodings.contains("tight"));

        let medium = EncodingProfile::for_quality(VncQuality::Medium);
        assert!(medium.encodings.starts_with("tight"));
    }
}
