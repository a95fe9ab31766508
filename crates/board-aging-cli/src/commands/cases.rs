use colored::Colorize;

use board_aging::CaseKind;

pub fn cmd_cases() {
    println!("{}", "Available cases:".bright_blue());
    for kind in CaseKind::ALL {
        let marker = if CaseKind::CORE.contains(&kind) {
            format!("{:<9}", "default").green()
        } else if kind.needs_secondary() {
            format!("{:<9}", "2 boards").yellow()
        } else {
            format!("{:<9}", "").normal()
        };
        println!(
            "  {} {} {}",
            format!("{:<26}", kind.name()).cyan(),
            marker,
            kind.description()
        );
    }
}
