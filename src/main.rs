fn main() {
    #[cfg(feature = "cli")]
    oximerge::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("oximerge: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
