fn main() {
    if let Err(err) = compound_graph_view::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
