use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

pub fn print_banner() {
    println!(
        "\n{} {}  {}\n",
        ROCKET,
        style("docpack").bold().cyan(),
        style("live repository analysis streams").dim()
    );
}

enum GuideRow {
    Command(String, String),
    Text(String),
    Blank,
}

/// Titled block of help rows: aligned `command  description` pairs, free text
/// and spacers.
pub struct GuideSection {
    title: String,
    rows: Vec<GuideRow>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.rows
            .push(GuideRow::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn text(mut self, line: &str) -> Self {
        self.rows.push(GuideRow::Text(line.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.rows.push(GuideRow::Blank);
        self
    }

    fn render_rows(&self) -> Vec<String> {
        let width = self
            .rows
            .iter()
            .filter_map(|row| match row {
                GuideRow::Command(name, _) => Some(name.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        self.rows
            .iter()
            .map(|row| match row {
                GuideRow::Command(name, desc) => {
                    format!("  {:<width$}  {}", name, desc, width = width)
                }
                GuideRow::Text(line) => format!("  {}", line),
                GuideRow::Blank => String::new(),
            })
            .collect()
    }

    pub fn print(self) {
        println!("\n {}", style(&self.title).bold().underlined());
        for row in self.render_rows() {
            println!("{}", row);
        }
    }
}
