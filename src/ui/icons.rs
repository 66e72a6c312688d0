pub struct Icons;

impl Icons {
    pub const CHECK: &str = "✅";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const DATABASE: &str = "🗄️";
    pub const CLOUD: &str = "☁️";
    pub const PERSON: &str = "👤";
    pub const CHAT: &str = "💬";
    pub const SCROLL: &str = "📜";
    pub const STAR: &str = "✨";
    pub const DEL: &str = "🗑️";
    pub const KEY: &str = "🔑";
    pub const OM: &str = "🕉️";
}
