// API Constants
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const DEFAULT_REMOTE_URL: &str = "https://api.llama.com/compat";
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-4-Maverick-17B-128E-Instruct-FP8";
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_REPETITION_PENALTY: f32 = 1.0;
pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 2048;

// Providers name their models differently; keep this list in sync with the remote.
pub const SUPPORTED_REMOTE_MODELS: &[&str] = &[
    "meta-llama/Llama-4-Maverick-17B-128E-Instruct-FP8",
    "meta-llama/Llama-4-Scout-17B-16E-Instruct",
];

// Environment overrides
pub const API_KEY_ENV: &str = "LLAMA_API_KEY";
pub const REMOTE_URL_ENV: &str = "REMOTE_INFERENCE_URL";

// Book inference server
pub const DEFAULT_INFERENCE_SERVER_URL: &str = "http://localhost:5001";
pub const BOOK_INFERENCE_PATH: &str = "/inference";
pub const BOOK_CHAT_PATH: &str = "/chat";
pub const BOOK_CHAT_GREETING: &str =
    "Hello! I can answer questions about this book. What would you like to know?";
pub const BOOK_CHAT_FALLBACK: &str =
    "Sorry, I couldn't process your question. Please try again.";
