use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_banner() {
    let lines: &[&str] = &[
        "  __              _ _ _            ",
        " / _| ___  ___  __| | (_)_ __   ___ ",
        "| |_ / _ \\/ _ \\/ _` | | | '_ \\ / _ \\",
        "|  _|  __/  __/ (_| | | | | | |  __/",
        "|_|  \\___|\\___|\\__,_|_|_|_| |_|\\___|",
    ];

    println!();
    for line in lines {
        println!("{}", style(line).cyan());
    }
    println!(
        "{}\n",
        style("Your agent's every move, live in the feed.").dim()
    );
}
