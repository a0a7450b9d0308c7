//! Platform network helpers: host reachability probe and TCP keepalive
//! configuration for the codec's socket.

use std::net::TcpStream;
use std::process::{Command, Stdio};
use std::time::Duration;

use socket2::{Socket, TcpKeepalive};

/// Probe a host with a single system ping. Used only to classify failed
/// connect attempts (host down vs. server not running), so a failure to
/// spawn the ping binary simply reports the host as unreachable.
pub fn ping(host: &str) -> bool {
    let mut cmd = Command::new("ping");
    if cfg!(windows) {
        cmd.arg("-n").arg("1").arg("-w").arg("1000");
    } else {
        cmd.arg("-c").arg("1").arg("-W").arg("1");
    }
    cmd.arg(host).stdout(Stdio::null()).stderr(Stdio::null());

    match cmd.status() {
        Ok(status) => status.success(),
        Err(e) => {
            log::debug!("ping {host} failed to run: {e}");
            false
        }
    }
}

/// Configure TCP keepalive on an established stream.
pub fn configure_socket_keepalive(
    stream: &TcpStream,
    enabled: bool,
    idle_time: Duration,
    interval: Duration,
    count: u32,
) {
    let Ok(clone) = stream.try_clone() else {
        log::warn!("cannot clone socket for keepalive configuration");
        return;
    };
    let sock = Socket::from(clone);

    if enabled {
        let ka = TcpKeepalive::new()
            .with_time(idle_time)
            .with_interval(interval)
            .with_retries(count);
        if let Err(e) = sock.set_tcp_keepalive(&ka) {
            log::warn!("failed to enable TCP keepalive: {e}");
        }
    } else if let Err(e) = sock.set_keepalive(false) {
        log::warn!("failed to disable TCP keepalive: {e}");
    }

    // Detach without closing -- the TcpStream still owns the fd
    std::mem::forget(sock);
}
