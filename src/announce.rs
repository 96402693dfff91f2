/// Speech and sound output; every call is fire-and-forget
pub trait Announcer: Send + Sync {
    fn speak(&self, text: &str);
    fn speak_async(&self, text: &str);
    fn play_sound(&self, resource: &str);
}

/// Headless announcer: writes what would be said to the log
#[derive(Debug, Default)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn speak(&self, text: &str) {
        log::info!("[speech] {}", text);
    }

    fn speak_async(&self, text: &str) {
        log::info!("[speech] {}", text);
    }

    fn play_sound(&self, resource: &str) {
        log::debug!("[sound] {}", resource);
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// Keeps what was announced instead of saying it
    #[derive(Default)]
    pub struct SilentAnnouncer {
        pub spoken: Mutex<Vec<String>>,
        pub sounds: Mutex<Vec<String>>,
    }

    impl SilentAnnouncer {
        pub fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    impl Announcer for SilentAnnouncer {
        fn speak(&self, text: &str) {
            self.spoken.lock().unwrap().push(text.to_string());
        }

        fn speak_async(&self, text: &str) {
            self.spoken.lock().unwrap().push(text.to_string());
        }

        fn play_sound(&self, resource: &str) {
            self.sounds.lock().unwrap().push(resource.to_string());
        }
    }
}
