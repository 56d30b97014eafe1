//! Audio source component
//!
//! Playback belongs to the host's audio system; this only carries the
//! settings a scene file stores.

/// Clip reference and playback settings
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSourceComponent {
    clip: Option<String>,
    volume: f32,
    looping: bool,
}

impl Default for AudioSourceComponent {
    fn default() -> Self {
        Self {
            clip: None,
            volume: 1.0,
            looping: false,
        }
    }
}

impl AudioSourceComponent {
    /// Silent source at full volume
    pub fn new() -> Self {
        Self::default()
    }

    /// Clip identifier understood by the audio system
    pub fn clip(&self) -> Option<&str> {
        self.clip.as_deref()
    }

    /// Set the clip. Whitespace is replaced so the id stays one token.
    pub fn set_clip(&mut self, clip: impl Into<String>) {
        let clip: String = clip.into();
        self.clip = Some(clip.split_whitespace().collect::<Vec<_>>().join("_"));
    }

    /// Linear volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set the linear volume, clamped to `[0, 1]`
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Whether playback loops
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Enable or disable looping
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub(crate) fn serialize(&self, out: &mut String) {
        out.push_str("audiosource\n");
        if let Some(clip) = &self.clip {
            out.push_str(&format!("audioclip {}\n", clip));
        }
        out.push_str(&format!("volume {}\n", self.volume));
        out.push_str(&format!("looping {}\n", u8::from(self.looping)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize() {
        let mut source = AudioSourceComponent::new();
        source.set_clip("sounds/laser shot.wav");
        source.set_volume(0.25);
        source.set_looping(true);

        let mut out = String::new();
        source.serialize(&mut out);
        assert_eq!(out, "audiosource\naudioclip sounds/laser_shot.wav\nvolume 0.25\nlooping 1\n");
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut source = AudioSourceComponent::new();
        source.set_volume(3.0);
        assert_eq!(source.volume(), 1.0);
    }
}
