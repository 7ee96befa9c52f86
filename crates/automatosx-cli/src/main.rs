fn main() {
    // Reset SIGPIPE to default behavior so a client closing its read
    // end of stdout doesn't take the whole process down with it.
    #[cfg(unix)]
    reset_sigpipe();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start the tokio runtime");

    if let Err(err) = runtime.block_on(automatosx_cli::run()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}
