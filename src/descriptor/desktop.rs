// src/descriptor/desktop.rs

//! Desktop menu entry

use crate::config::DesktopSection;

/// Fields of a `[Desktop Entry]` group for one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name: String,
    pub comment: String,
    pub exec: String,
    pub icon: String,
    pub terminal: bool,
    pub categories: Vec<String>,
}

impl DesktopEntry {
    /// Fill in from configuration, defaulting names to the package summary
    pub fn new(section: &DesktopSection, summary: &str, exec: String, icon: String) -> Self {
        Self {
            name: section.name.clone().unwrap_or_else(|| summary.to_string()),
            comment: section
                .comment
                .clone()
                .unwrap_or_else(|| summary.to_string()),
            exec,
            icon,
            terminal: section.terminal,
            categories: section.categories.clone(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("[Desktop Entry]\n");
        out.push_str("Type=Application\n");
        out.push_str(&format!("Name={}\n", escape_value(&self.name)));
        out.push_str(&format!("Comment={}\n", escape_value(&self.comment)));
        out.push_str(&format!("Exec={}\n", quote_exec(&self.exec)));
        out.push_str(&format!("Icon={}\n", escape_value(&self.icon)));
        out.push_str(&format!("Terminal={}\n", self.terminal));
        if !self.categories.is_empty() {
            let categories: Vec<String> =
                self.categories.iter().map(|c| escape_value(c)).collect();
            out.push_str(&format!("Categories={};\n", categories.join(";")));
        }
        out.push_str("StartupNotify=true\n");
        out
    }
}

/// Escape a string value per the desktop entry format
fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ';' => out.push_str("\\;"),
            _ => out.push(c),
        }
    }
    out
}

/// Quote the program path of an `Exec` key when it contains reserved
/// characters
fn quote_exec(program: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(', ')', '`',
    ];
    let program = program.replace('%', "%%");
    if !program.contains(RESERVED) {
        return program;
    }
    let mut quoted = String::from("\"");
    for c in program.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    escape_value(&quoted)
}
