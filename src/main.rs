fn main() {
    if let Err(err) = swimlane_flow::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
