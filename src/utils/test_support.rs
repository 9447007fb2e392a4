/// Mock HTTP servers need a localhost listener; some sandboxes refuse one.
pub fn should_skip_httpmock() -> bool {
    match std::net::TcpListener::bind(("127.0.0.1", 0)) {
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping mock http test: binding to localhost is not permitted");
            true
        }
        Err(err) => panic!("failed to bind localhost for mock http tests: {err}"),
    }
}
