fn main() {
    if let Err(err) = winops::cli::run() {
        winops::ui::eprintln_error(&err);
        std::process::exit(winops::exit::exit_code(&err));
    }
}
