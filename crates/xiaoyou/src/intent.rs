/// Queries asking for a video are answered locally; the service only does text.
const VIDEO_KEYWORDS: &[&str] = &[
    "视频",
    "生成视频",
    "做视频",
    "制作视频",
    "剪辑视频",
    "短视频",
    "video",
    "generate video",
    "make video",
    "create video",
];

pub const VIDEO_FALLBACK_ANSWER: &str = "当前这个入口只支持文字问答，暂不支持直接生成视频。

你可以继续问我文案、脚本、分镜，我可以先帮你产出：
• 30秒口播文案
• 镜头分镜脚本
• 配音台词与字幕稿";

pub fn is_video_generation_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    VIDEO_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_video_requests() {
        assert!(is_video_generation_request("帮我生成视频"));
        assert!(is_video_generation_request("来个短视频"));
        assert!(is_video_generation_request("Please MAKE VIDEO of squats"));
        assert!(is_video_generation_request("any Video?"));
    }

    #[test]
    fn test_ignores_text_questions() {
        assert!(!is_video_generation_request("如何避免运动损伤?"));
        assert!(!is_video_generation_request("give me a plank routine"));
        assert!(!is_video_generation_request(""));
    }
}
