use tabled::{settings::Style, Table, Tabled};

use crate::model::{ChatTurn, Conversation, Profile};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Setting")]
    pub setting: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Two-column key/value table
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            setting: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

#[derive(Tabled)]
struct ConversationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Created")]
    created: String,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Date of Birth")]
    dob: String,
    #[tabled(rename = "Time")]
    tob: String,
    #[tabled(rename = "City")]
    city: String,
}

#[derive(Tabled)]
struct TurnRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Message")]
    content: String,
}

pub fn conversations_table(conversations: &[Conversation]) -> String {
    let rows: Vec<_> = conversations
        .iter()
        .map(|c| ConversationRow {
            id: c.id.to_string(),
            title: c.title.clone(),
            created: c.created_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn profiles_table(profiles: &[Profile]) -> String {
    let rows: Vec<_> = profiles
        .iter()
        .map(|p| ProfileRow {
            name: p.name.clone(),
            dob: p.dob_text(),
            tob: p.tob_text(),
            city: p.birth_city.clone(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn history_table(turns: &[ChatTurn]) -> String {
    let rows: Vec<_> = turns
        .iter()
        .enumerate()
        .map(|(i, t)| TurnRow {
            index: i + 1,
            role: t.role.to_string(),
            content: t.content.clone(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
