use relay::{Error, Runtime};

// Lowers RLIMIT_NOFILE for the whole process, so it lives in its own test binary.
#[test]
fn poll_failures_stop_the_loop() {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) }, 0);

    let lowered = libc::rlimit {
        rlim_cur: 32,
        rlim_max: limit.rlim_max,
    };
    assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lowered) }, 0);

    let runtime = Runtime::new();
    let handle = runtime.handle();

    // poll(2) refuses more entries than the descriptor limit with EINVAL.
    for offset in 0..64 {
        handle.add_read_stream(100_000 + offset, || {});
    }

    let result = runtime.run();
    unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) };

    assert!(matches!(result, Err(Error::Poll(_))));
}
