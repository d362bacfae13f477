//! Operator console: every line on stdin becomes a GM command for the world.
//!
//! Stdin is read with blocking IO on its own OS thread. That thread is never
//! joined, so a read still pending at shutdown does not keep the process
//! alive.

use crate::world::{marks, WORLD_SERVICE_ID};
use server_engine::{ServiceHost, ServiceMessage};
use std::io::{self, BufRead, BufReader};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Name of the thread that reads operator input.
pub const CONSOLE_THREAD_NAME: &str = "gm-console";

/// Starts reading GM commands from stdin on a dedicated thread.
///
/// # Arguments
///
/// * `host` - Service host used to deliver each command to the world
///
/// # Returns
///
/// The thread's handle, or an error if the thread could not be spawned.
/// The thread ends when stdin closes; callers may drop the handle.
pub fn spawn_console(host: ServiceHost) -> io::Result<JoinHandle<usize>> {
    spawn_reader(BufReader::new(io::stdin()), host)
}

/// Like [`spawn_console`], reading from any line source.
pub fn spawn_reader<R>(reader: R, host: ServiceHost) -> io::Result<JoinHandle<usize>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name(CONSOLE_THREAD_NAME.to_string())
        .spawn(move || forward_commands(reader, &host))
}

/// Forwards each non-empty line of `reader` to the world service and
/// returns how many were delivered.
pub fn forward_commands<R: BufRead>(reader: R, host: &ServiceHost) -> usize {
    let mut delivered = 0;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Console input failed: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match host.deliver(WORLD_SERVICE_ID, ServiceMessage::new(marks::GM_COMMAND, line.to_string())) {
            Ok(()) => delivered += 1,
            Err(e) => warn!("Dropping console command {:?}: {}", line, e),
        }
    }

    debug!(delivered, "Console input closed");
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{WorldService, WorldSettings};
    use crossbeam::channel::{unbounded, Receiver};
    use server_engine::{OffsetClock, ServiceId, ServiceRunner, TaskRegistrar};
    use std::io::Read;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn host_with_world() -> (ServiceHost, Arc<ServiceRunner<WorldService>>) {
        let clock = Arc::new(OffsetClock::default());
        let host = ServiceHost::new(TaskRegistrar::default(), clock.clone());
        let world = host
            .spawn_service(
                WORLD_SERVICE_ID,
                "world",
                WorldService::new(WorldSettings {
                    clock,
                    presence_timeout: 1_000,
                }),
                Arc::new(WorldService::router().unwrap()),
                None,
            )
            .unwrap();
        (host, world)
    }

    #[test]
    fn test_lines_are_delivered_to_world() {
        let (host, world) = host_with_world();

        let input: &[u8] = b"echo one\n\n   \nnow\n";
        let delivered = forward_commands(input, &host);

        assert_eq!(delivered, 2);
        assert_eq!(world.endpoint().pending_messages(), 2);
    }

    #[test]
    fn test_without_world_nothing_is_delivered() {
        let host = ServiceHost::new(TaskRegistrar::default(), Arc::new(OffsetClock::default()));
        let input: &[u8] = b"echo lost\n";
        assert_eq!(forward_commands(input, &host), 0);
        assert!(!host.directory().contains(ServiceId(1)));
    }

    /// Blocks in `read` until a chunk arrives or every sender is gone.
    struct BlockingInput {
        chunks: Receiver<Vec<u8>>,
    }

    impl Read for BlockingInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.recv() {
                Ok(chunk) => {
                    let len = chunk.len().min(buf.len());
                    buf[..len].copy_from_slice(&chunk[..len]);
                    Ok(len)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn test_pending_read_does_not_hold_the_caller() {
        let (host, world) = host_with_world();
        let (input, chunks) = unbounded();

        let console = spawn_reader(BufReader::new(BlockingInput { chunks }), host).unwrap();
        assert_eq!(console.thread().name(), Some(CONSOLE_THREAD_NAME));

        input.send(b"echo hi\n".to_vec()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while world.endpoint().pending_messages() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(world.endpoint().pending_messages(), 1);

        // Still parked in `read`; nothing here waits for it.
        assert!(!console.is_finished());

        drop(input);
        assert_eq!(console.join().unwrap(), 1);
    }
}
