use colored::Colorize;

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

/// One aligned `key: value` line under a header.
pub fn field(key: &str, value: &str) {
    println!("  {:<18} {}", format!("{key}:").dimmed(), value);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_do_not_panic() {
        header("Dead letters");
        field("queue", "create_person_queue:dlq");
        warn("in-process broker");
        error("probe failed");
        success("broker reachable");
    }
}
