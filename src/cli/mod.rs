use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Backend Endpoints ---
    /// Base URL of the governance backend REST API.
    #[arg(long, env = "API_BASE", default_value = "http://localhost:8000")]
    pub api_base: String,

    /// Base URL for the observer feed websocket. Derived from --api-base
    /// (http -> ws) when not set.
    #[arg(long, env = "WS_BASE")]
    pub ws_base: Option<String>,

    /// Bearer token used for REST calls.
    #[arg(long, env = "AUTH_TOKEN", default_value = "")]
    pub auth_token: String,

    // --- Chatbot Scope ---
    /// Chatbot id to scope the feed and chat exchange to. Falls back to the
    /// persisted selection, then to the first chatbot in the organization.
    #[arg(long, env = "CHATBOT_ID")]
    pub chatbot_id: Option<String>,

    /// Chatbot-scoped API key for the public chat endpoint. Falls back to the
    /// bot's preview key when not set.
    #[arg(long, env = "CHAT_API_KEY")]
    pub chat_api_key: Option<String>,

    /// Path of the file that persists the selected chatbot between runs.
    #[arg(long, env = "SELECTION_PATH", default_value = ".veritas/selection.json")]
    pub selection_path: String,

    // --- Console Behavior ---
    /// Console mode (observe, chat).
    #[arg(long, env = "MODE", default_value = "observe")]
    pub mode: String,

    /// What to do with a partially streamed reply when the exchange fails
    /// midway (apology, preserve).
    #[arg(long, env = "FAILURE_POLICY", default_value = "apology")]
    pub failure_policy: String,

    /// Enable debug logging/output.
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
