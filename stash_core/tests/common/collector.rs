//! Loopback line collector that can be stopped and restarted on the same port

use std::io::{self, BufRead, BufReader};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Running {
    stop: Arc<AtomicBool>,
    acceptor: JoinHandle<()>,
    connections: Arc<Mutex<Vec<(TcpStream, JoinHandle<()>)>>>,
}

pub struct Collector {
    pub port: u16,
    lines: Arc<Mutex<Vec<Vec<u8>>>>,
    running: Option<Running>,
}

impl Collector {
    /// Start a collector on a random port
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind collector");
        let port = listener.local_addr().unwrap().port();
        let mut collector = Collector {
            port,
            lines: Arc::new(Mutex::new(Vec::new())),
            running: None,
        };
        collector.serve(listener);
        collector
    }

    /// A port that nothing listens on (yet)
    pub fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Start a collector on a known port
    pub fn start_on(port: u16) -> Self {
        let mut collector = Collector {
            port,
            lines: Arc::new(Mutex::new(Vec::new())),
            running: None,
        };
        collector.restart();
        collector
    }

    /// Close the listener and every accepted connection
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.stop.store(true, Ordering::SeqCst);
        running.acceptor.join().unwrap();

        let connections: Vec<_> = running.connections.lock().unwrap().drain(..).collect();
        for (stream, reader) in connections {
            let _ = stream.shutdown(Shutdown::Both);
            drop(stream);
            reader.join().unwrap();
        }
    }

    /// Listen again on the same port, keeping the lines received so far
    pub fn restart(&mut self) {
        self.stop();
        let deadline = Instant::now() + Duration::from_secs(5);
        let listener = loop {
            match TcpListener::bind(("127.0.0.1", self.port)) {
                Ok(listener) => break listener,
                Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                Err(err) => panic!("Failed to rebind collector: {err}"),
            }
        };
        self.serve(listener);
    }

    /// Complete lines received so far, terminator stripped
    pub fn lines(&self) -> Vec<Vec<u8>> {
        self.lines.lock().unwrap().clone()
    }

    pub fn text_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .map(|line| String::from_utf8(line).unwrap())
            .collect()
    }

    /// Wait until at least `count` lines have arrived
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.lines.lock().unwrap().len() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.lines.lock().unwrap().len() >= count
    }

    fn serve(&mut self, listener: TcpListener) {
        listener.set_nonblocking(true).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(Mutex::new(Vec::new()));

        let acceptor = {
            let stop = stop.clone();
            let connections = connections.clone();
            let lines = self.lines.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            stream.set_nonblocking(false).unwrap();
                            let reader = spawn_reader(stream.try_clone().unwrap(), lines.clone());
                            connections.lock().unwrap().push((stream, reader));
                        }
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(5));
                        }
                        Err(_) => break,
                    }
                }
            })
        };

        self.running = Some(Running {
            stop,
            acceptor,
            connections,
        });
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_reader(stream: TcpStream, lines: Arc<Mutex<Vec<Vec<u8>>>>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    // A line cut short by a closing connection is not a message.
                    if line.pop() == Some(b'\n') {
                        lines.lock().unwrap().push(line);
                    }
                }
            }
        }
    })
}
