use log::{LevelFilter, Log, Metadata, Record};
use mycoroutine::Registry;
use std::sync::Mutex;

struct Capture(Mutex<Vec<String>>);

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if record.target().starts_with("mycoroutine") {
            self.0.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture(Mutex::new(Vec::new()));

#[test]
fn dispatcher_traces_each_switch() {
    log::set_logger(&CAPTURE).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let registry = Registry::new();
    for _ in 0..2 {
        registry
            .spawn(|registry| {
                registry.yield_now();
            })
            .unwrap();
    }
    let stats = registry.start().unwrap();

    let lines = CAPTURE.0.lock().unwrap();
    let control = lines
        .iter()
        .filter(|line| *line == "main context: get control")
        .count();
    let switches = lines
        .iter()
        .filter(|line| line.starts_with("main coroutine: switch"))
        .count();
    assert_eq!(control, 1);
    assert_eq!(switches as u64, stats.resumptions);
    assert_eq!(stats.resumptions, 4);
}
