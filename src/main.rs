fn main() {
    quote_desk_lib::logging::init();

    if let Err(error) = quote_desk_lib::run() {
        tracing::error!(%error, "quote desk failed");
        std::process::exit(1);
    }
}
