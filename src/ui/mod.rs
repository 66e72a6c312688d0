pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{banner, dim, header, info, role_label, section, success, warn};
pub use table::{conversations_table, history_table, profiles_table, TableBuilder};
pub use theme::{theme, Theme};
