//! Generation parameter presets per use-case tag (§4.10, supplemented from
//! `original_source/memscreen/llm/performance_config.py`'s
//! `PerformanceOptimizer.get_optimized_params`).

/// The six named use-case tags the router and other C2 callers pick
/// presets by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseCase {
    /// General-purpose chat.
    Chat,
    /// Chat on a faster/smaller model tier.
    ChatFast,
    /// Multimodal (vision) calls.
    Vision,
    /// C7's compression step.
    Summary,
    /// Precision-favoring search-assist calls.
    Search,
    /// C9's fact-extraction/update-plan calls and C6's conflict
    /// adjudication: lowest temperature/top_p/top_k to minimize
    /// hallucination against retrieved context.
    Memory,
}

/// A fixed generation parameter bundle for one use case.
#[derive(Debug, Clone, Copy)]
pub struct GenerationPreset {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: Option<u32>,
    pub num_ctx: Option<u32>,
}

impl UseCase {
    pub fn preset(&self) -> GenerationPreset {
        match self {
            UseCase::Chat => GenerationPreset {
                max_tokens: 384,
                temperature: 0.45,
                top_p: 0.85,
                top_k: Some(25),
                num_ctx: Some(4096),
            },
            UseCase::ChatFast => GenerationPreset {
                max_tokens: 256,
                temperature: 0.5,
                top_p: 0.9,
                top_k: Some(30),
                num_ctx: Some(2048),
            },
            UseCase::Vision => GenerationPreset {
                max_tokens: 512,
                temperature: 0.4,
                top_p: 0.85,
                top_k: Some(25),
                num_ctx: Some(4096),
            },
            UseCase::Summary => GenerationPreset {
                max_tokens: 256,
                temperature: 0.3,
                top_p: 0.8,
                top_k: Some(20),
                num_ctx: Some(4096),
            },
            UseCase::Search => GenerationPreset {
                max_tokens: 256,
                temperature: 0.3,
                top_p: 0.8,
                top_k: Some(20),
                num_ctx: Some(4096),
            },
            UseCase::Memory => GenerationPreset {
                max_tokens: 512,
                temperature: 0.2,
                top_p: 0.75,
                top_k: Some(15),
                num_ctx: Some(4096),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_preset_has_the_lowest_temperature() {
        let memory = UseCase::Memory.preset().temperature;
        for uc in [UseCase::Chat, UseCase::ChatFast, UseCase::Vision, UseCase::Summary, UseCase::Search] {
            assert!(memory <= uc.preset().temperature);
        }
    }

    #[test]
    fn all_presets_have_positive_max_tokens() {
        for uc in [UseCase::Chat, UseCase::ChatFast, UseCase::Vision, UseCase::Summary, UseCase::Search, UseCase::Memory] {
            assert!(uc.preset().max_tokens > 0);
        }
    }
}
