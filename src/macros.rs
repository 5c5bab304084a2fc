#[macro_export]
macro_rules! make_notes {
    ($file:expr, $quiet:expr, $heading:literal, $($arg:tt)*) => {{
        use std::io::Write;
        // if $quiet is false we will write output to screen
        if !$quiet {
            print!($($arg)*);
        }

        let formatted = format!($($arg)*);

        //Create plain text from colored one
        let mut plain = $crate::macros::strip_ansi(&formatted);

        // Add Markdown heading if requested
        if $heading > 0 {
            let prefix = "#".repeat($heading as usize);
            plain = format!("{} {}\n", prefix, plain.trim());
        }

        // Append to file - notes are best effort, the screen output already happened
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open($file)
        {
            let _ = write!(file, "{}", plain);
        }
    }};
}

#[macro_export]
macro_rules! debug_trace {
    ($($arg:tt)*) => {{
        use std::io::Write;

        if let Ok(trace_file) = std::env::var("TABQUERY_TRACE") {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(trace_file)
            {
                let _ = writeln!(file, "{}", format_args!($($arg)*));
            }
        }
    }};
}

#[macro_export]
macro_rules! debug_note {
    ($($arg:tt)*) => {{
        let time = $crate::macros::get_timestamp();
        let file = file!();
        let line = line!();
        $crate::debug_trace!(
            "[{}] [{}:{}] {}",
            time,
            file,
            line,
            format_args!($($arg)*)
        );
    }};
}

pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

// remove everything starting with ESC ( \x1B ), than [, digits and ;,
// and ending with 'm' or 'K'.
pub fn strip_ansi(input: &str) -> String {
    match regex::Regex::new(r"\x1B\[[0-9;]*[mK]") {
        Ok(re) => re.replace_all(input, "").to_string(),
        Err(_) => input.to_string(),
    }
}
