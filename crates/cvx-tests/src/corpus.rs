//! Synthetic test corpus.

use cvx_compute::OperationDescriptor;
use cvx_core::{Image, Pattern, SUPPORTED_CHANNELS};

/// One corpus input.
#[derive(Debug, Clone)]
pub struct Case {
    pub pattern: Pattern,
    pub channels: u8,
    pub image: Image,
}

impl Case {
    /// `gradient@4` style label for assertion messages.
    pub fn label(&self) -> String {
        format!("{}@{}", self.pattern.name(), self.channels)
    }
}

/// Every corpus pattern at every supported channel count.
pub fn corpus(width: u32, height: u32) -> Vec<Case> {
    let mut cases = Vec::with_capacity(Pattern::CORPUS.len() * SUPPORTED_CHANNELS.len());
    for pattern in Pattern::CORPUS {
        for channels in SUPPORTED_CHANNELS {
            // Dimensions and channel counts here are always valid.
            if let Ok(image) = pattern.generate(width, height, channels) {
                cases.push(Case {
                    pattern,
                    channels,
                    image,
                });
            }
        }
    }
    cases
}

/// The corpus restricted to channel counts `desc` accepts on the host.
pub fn corpus_for(desc: &OperationDescriptor, width: u32, height: u32) -> Vec<Case> {
    corpus(width, height)
        .into_iter()
        .filter(|case| desc.host_channels.supports(case.channels))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvx_compute::Registry;

    #[test]
    fn test_corpus_size() {
        let cases = corpus(9, 7);
        assert_eq!(cases.len(), 15);
        assert!(cases.iter().all(|c| c.image.channels() == c.channels));
    }

    #[test]
    fn test_corpus_for_filters_channels() {
        let reg = Registry::builtin();
        let sobel = corpus_for(reg.lookup("sobel").unwrap(), 4, 4);
        assert!(sobel.iter().all(|c| c.channels == 1));
        assert_eq!(sobel.len(), Pattern::CORPUS.len());
    }
}
