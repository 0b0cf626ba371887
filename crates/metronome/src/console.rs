//! Console-window visibility as a platform capability.

/// Show/hide for the console window hosting the instance. The channel
/// accepts the requests on every platform; what they do is up to the
/// implementation behind this trait.
pub trait ConsoleWindow {
    fn show(&self);
    fn hide(&self);
}

/// Unix builds own no console window, so visibility requests are accepted
/// and logged but change nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformConsole;

impl ConsoleWindow for PlatformConsole {
    fn show(&self) {
        tracing::debug!("console show is a no-op on this platform");
    }

    fn hide(&self) {
        tracing::debug!("console hide is a no-op on this platform");
    }
}
