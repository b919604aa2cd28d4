//! Emulated multi-touch devices.
//!
//! Each panel contact is backed by one kernel virtual input device, created
//! eagerly at startup through uinput. The gesture engine talks to the
//! [`DevicePool`], which owns the devices and addresses them by contact id.

use std::io;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, EventType, InputEvent, Key, MiscType,
    RelativeAxisType, Synchronization, UinputAbsSetup,
};

/* From linux/input-event-codes.h — aliases the evdev crate spells differently */
pub const BTN_MOUSE: Key = Key::BTN_LEFT;
pub const BTN_WHEEL: Key = Key::BTN_GEAR_DOWN;

/// Device node name prefix; the contact id is appended.
const DEVICE_NAME_PREFIX: &str = "pytouchd-emutouchdev";

/// Advertised X axis range of the panel.
const ABS_X_MAX: i32 = 1023;
/// Advertised Y axis range of the panel.
const ABS_Y_MAX: i32 = 599;

/// Every key an emulated device may emit. Presses outside this set are
/// rejected before they reach the kernel.
const DEVICE_KEYS: [Key; 16] = [
    BTN_MOUSE,
    Key::BTN_RIGHT,
    Key::BTN_MIDDLE,
    Key::BTN_SIDE,
    BTN_WHEEL,
    Key::KEY_ZOOM,
    Key::KEY_ZOOMIN,
    Key::KEY_ZOOMOUT,
    Key::KEY_ZOOMRESET,
    Key::KEY_LEFTCTRL,
    Key::KEY_SLASH,
    Key::KEY_RIGHTBRACE,
    Key::KEY_LEFT,
    Key::KEY_RIGHT,
    Key::KEY_UP,
    Key::KEY_DOWN,
];

/// An error produced while creating or driving a virtual device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("keycode {0:?} is not in the advertised capability set")]
    UnsupportedKey(Key),

    #[error("virtual device registration failed: {0}")]
    Register(#[source] io::Error),

    #[error("virtual device write failed: {0}")]
    Write(#[from] io::Error),
}

/// The raw event sink behind an emulated device. The one real implementation
/// is [`VirtualDevice`]; tests install a recorder here.
pub trait UinputSink {
    fn emit(&mut self, events: &[InputEvent]) -> io::Result<()>;
}

impl UinputSink for VirtualDevice {
    fn emit(&mut self, events: &[InputEvent]) -> io::Result<()> {
        VirtualDevice::emit(self, events)
    }
}

/// One kernel virtual input device plus the pointer state retained for it.
#[derive(Debug)]
pub struct EmulatedDevice<S = VirtualDevice> {
    id: usize,
    sink: S,
    x: i32,
    y: i32,
    held: Option<Key>,
}

impl EmulatedDevice<VirtualDevice> {
    /// Register a new virtual device with the kernel.
    pub fn create(id: usize) -> Result<Self, DeviceError> {
        log::info!("creating emulated touch device #{id}");
        let device = build_device(id).map_err(DeviceError::Register)?;
        Ok(Self::with_sink(id, device))
    }
}

impl<S: UinputSink> EmulatedDevice<S> {
    pub fn with_sink(id: usize, sink: S) -> Self {
        Self { id, sink, x: 0, y: 0, held: None }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The last position moved to.
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Press `key` (value 1). See [`press_with`](Self::press_with) for the
    /// autorepeat variant.
    pub fn press(&mut self, key: Key) -> Result<(), DeviceError> {
        self.press_with(key, 1)
    }

    /// Press `key` with an explicit event value (1 = down, 2 = autorepeat).
    /// Keys outside the advertised capability set are rejected.
    pub fn press_with(&mut self, key: Key, value: i32) -> Result<(), DeviceError> {
        if !DEVICE_KEYS.contains(&key) {
            return Err(DeviceError::UnsupportedKey(key));
        }
        log::debug!("dev #{}: press {key:?} value {value}", self.id);
        self.emit(&[InputEvent::new(EventType::KEY, key.code(), value)])?;
        self.held = Some(key);
        Ok(())
    }

    /// Release `key`, or the currently held key when `None`. A release with
    /// nothing held is a no-op, so releasing twice is safe.
    pub fn release(&mut self, key: Option<Key>) -> Result<(), DeviceError> {
        let key = match key.or(self.held) {
            Some(key) => key,
            None => return Ok(()),
        };
        log::debug!("dev #{}: release {key:?}", self.id);
        self.emit(&[InputEvent::new(EventType::KEY, key.code(), 0)])?;
        if self.held == Some(key) {
            self.held = None;
        }
        Ok(())
    }

    /// Move the pointer to absolute screen coordinates.
    pub fn move_to(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
        log::debug!("dev #{}: move ({x}, {y})", self.id);
        self.emit(&[
            InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_X.0, x),
            InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_Y.0, y),
        ])?;
        self.x = x;
        self.y = y;
        Ok(())
    }

    /// Turn the scroll wheel by `amount` notches.
    pub fn scroll(&mut self, amount: i32, horizontal: bool) -> Result<(), DeviceError> {
        let axis = if horizontal { RelativeAxisType::REL_HWHEEL } else { RelativeAxisType::REL_WHEEL };
        log::debug!("dev #{}: scroll {amount} ({axis:?})", self.id);
        self.emit(&[InputEvent::new(EventType::RELATIVE, axis.0, amount)])?;
        Ok(())
    }

    /// Emit a batch followed by the sync pulse, so the kernel publishes the
    /// change atomically.
    fn emit(&mut self, events: &[InputEvent]) -> Result<(), DeviceError> {
        let mut batch = events.to_vec();
        batch.push(InputEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_REPORT.0, 0));
        self.sink.emit(&batch)?;
        Ok(())
    }
}

fn build_device(id: usize) -> io::Result<VirtualDevice> {
    let mut keys = AttributeSet::<Key>::new();
    for key in DEVICE_KEYS {
        keys.insert(key);
    }
    let mut rel = AttributeSet::<RelativeAxisType>::new();
    rel.insert(RelativeAxisType::REL_WHEEL);
    rel.insert(RelativeAxisType::REL_HWHEEL);
    let mut msc = AttributeSet::<MiscType>::new();
    msc.insert(MiscType::MSC_SCAN);

    VirtualDeviceBuilder::new()?
        .name(&format!("{DEVICE_NAME_PREFIX}-{id}"))
        .with_keys(&keys)?
        .with_absolute_axis(&UinputAbsSetup::new(
            AbsoluteAxisType::ABS_X,
            AbsInfo::new(0, 0, ABS_X_MAX, 0, 0, 0),
        ))?
        .with_absolute_axis(&UinputAbsSetup::new(
            AbsoluteAxisType::ABS_Y,
            AbsInfo::new(0, 0, ABS_Y_MAX, 0, 0, 0),
        ))?
        .with_relative_axes(&rel)?
        .with_msc(&msc)?
        .build()
}

/// Fixed pool of emulated devices, one per possible contact.
#[derive(Debug)]
pub struct DevicePool<S = VirtualDevice> {
    devices: Vec<EmulatedDevice<S>>,
}

impl DevicePool<VirtualDevice> {
    /// Register `count` virtual devices with the kernel. Any failure is
    /// fatal; already-created devices are unregistered on drop.
    pub fn create(count: usize) -> Result<Self, DeviceError> {
        let mut devices = Vec::with_capacity(count);
        for id in 0..count {
            devices.push(EmulatedDevice::create(id)?);
        }
        Ok(Self { devices })
    }
}

impl<S: UinputSink> DevicePool<S> {
    pub fn with_sinks(sinks: Vec<S>) -> Self {
        Self {
            devices: sinks
                .into_iter()
                .enumerate()
                .map(|(id, sink)| EmulatedDevice::with_sink(id, sink))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn device(&mut self, id: usize) -> &mut EmulatedDevice<S> {
        &mut self.devices[id]
    }

    pub fn devices(&self) -> &[EmulatedDevice<S>] {
        &self.devices
    }

    /// Last position moved to on device `id`.
    pub fn position(&self, id: usize) -> (i32, i32) {
        self.devices[id].position()
    }

    /// Release whatever key every device currently holds.
    pub fn release_all(&mut self) -> Result<(), DeviceError> {
        for device in &mut self.devices {
            device.release(None)?;
        }
        Ok(())
    }

    /// Unregister every device. Dropping does the same; the explicit call
    /// exists so the shutdown path can log it deterministically.
    pub fn close(self) {
        for device in &self.devices {
            log::info!("closing emulated touch device #{}", device.id());
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every emitted event instead of talking to the kernel.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub events: Vec<InputEvent>,
    }

    impl UinputSink for RecordingSink {
        fn emit(&mut self, events: &[InputEvent]) -> io::Result<()> {
            self.events.extend_from_slice(events);
            Ok(())
        }
    }

    /// A pool of `count` recording devices.
    pub fn recording_pool(count: usize) -> DevicePool<RecordingSink> {
        DevicePool::with_sinks((0..count).map(|_| RecordingSink::default()).collect())
    }
}
