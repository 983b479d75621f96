use click_track::config::DEFAULT_CONFIG_FILE;
use click_track::{CpalCapture, MetronomeApp, MetronomeConfig, create_notification_channel};
use crossbeam_channel::{select, tick};
use log::{debug, error};
use ringbuf::traits::Consumer;
use std::io::BufRead;
use std::thread;
use std::time::Duration;

const NOTIFICATION_RINGBUFFER_CAPACITY: usize = 256;
// Housekeeping rate of the runner, unrelated to beat timing
const UPDATE_INTERVAL: Duration = Duration::from_millis(50);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Click Track ===");

    let config = MetronomeConfig::load_or_default(DEFAULT_CONFIG_FILE);
    let (notification_tx, mut notification_rx) =
        create_notification_channel(NOTIFICATION_RINGBUFFER_CAPACITY);

    let mut app = match MetronomeApp::new(&config, CpalCapture::new(), notification_tx) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialise metronome: {e}");
            return;
        }
    };

    if let Err(e) = app.start() {
        error!("Failed to start metronome: {e}");
        return;
    }

    println!(
        "Playing at {} ({}), press Enter to stop",
        app.metronome().tempo(),
        app.metronome().pattern()
    );

    let (enter_tx, enter_rx) = crossbeam_channel::bounded::<()>(1);
    let stdin_reader = thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            let _ = enter_tx.send(());
        });
    if let Err(e) = stdin_reader {
        error!("Failed to read from stdin: {e}");
        app.stop();
        return;
    }

    let display = app.display();
    let ticker = tick(UPDATE_INTERVAL);
    let mut last_beat = None;

    loop {
        select! {
            recv(enter_rx) -> _ => break,
            recv(ticker) -> _ => {
                app.update();

                while let Some(notification) = notification_rx.try_pop() {
                    println!("{notification}");
                }

                let snapshot = display.snapshot();
                if snapshot.beat != last_beat {
                    debug!("{:?} {:?}", snapshot.transport, snapshot.beat);
                    last_beat = snapshot.beat;
                }
            }
        }
    }

    app.stop();
    println!("Stopped");
}
