use async_trait::async_trait;

/// Connection point for speech input. Recording and recognition live outside
/// this crate; implementations hand back the recognized text.
#[async_trait]
pub trait VoiceInput: Send + Sync {
    async fn transcribe(&self) -> String;
}

/// Used where no recognizer is available. Always yields nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedVoiceInput;

#[async_trait]
impl VoiceInput for UnsupportedVoiceInput {
    async fn transcribe(&self) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_voice_is_empty() {
        let voice: Box<dyn VoiceInput> = Box::new(UnsupportedVoiceInput);
        assert_eq!(voice.transcribe().await, "");
    }
}
