use crate::commands::UserCommand;
use crate::error::{ImageLoadError, TransportError};
use crate::garage_api::event_stream::{EventStream, StreamEvent};
use crate::garage_api::garage_client::GarageApiTrait;
use crate::garage_api::models::control::Control;
use crate::garage_api::models::response::status_response::StatusSnapshot;
use crate::image_refresh::{ImageLoad, ImageRefreshController, ImageState, RefreshTrigger};
use crate::notifier::{NotificationPermission, Notifier};
use crate::processors::image_processor::ImageProcessor;
use crate::processors::notification_processor::NotificationProcessor;
use crate::processors::status_processor::StatusProcessor;
use crate::processors::{Effect, EffectDispatcher};
use crate::reconciler::{Reconciler, ToggleTicket};
use crate::state::device_state::DeviceState;
use crate::state::store::SubscriptionId;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Everything that can happen to the session, normalised into one queue.
#[derive(Debug)]
pub enum SessionInput {
    Command(UserCommand),
    Status(Result<StatusSnapshot, TransportError>),
    ToggleSettled {
        ticket: ToggleTicket,
        result: Result<bool, TransportError>,
    },
    DoorToggleSettled(Result<(), TransportError>),
    ImageTick,
    /// A camera download finished; nothing has touched the disk yet.
    ImageFetched {
        generation: u64,
        result: Result<Bytes, ImageLoadError>,
    },
    /// The snapshot writer stored (or failed to store) an accepted image.
    ImageSettled {
        generation: u64,
        result: Result<(), ImageLoadError>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub camera_url: String,
    pub snapshot_path: PathBuf,
    pub image_refresh: Duration,
    pub status_poll: Option<Duration>,
    pub auto_image: bool,
    pub permission: NotificationPermission,
}

/// The single execution context: owns all state and handles one input at a
/// time. Network waits run in spawned tasks that report back through
/// `SessionInput`.
pub struct Session<T>
where
    T: GarageApiTrait + Clone + Send + Sync + 'static,
{
    api: T,
    options: SessionOptions,
    reconciler: Reconciler,
    image: ImageRefreshController,
    initial_load: Option<ImageLoad>,
    inputs_tx: UnboundedSender<SessionInput>,
    inputs_rx: UnboundedReceiver<SessionInput>,
    effects_rx: UnboundedReceiver<Effect>,
    dispatcher: SubscriptionId,
    image_writer: Option<UnboundedSender<(u64, Bytes)>>,
    background: Vec<JoinHandle<()>>,
}

impl<T> Session<T>
where
    T: GarageApiTrait + Clone + Send + Sync + 'static,
{
    pub fn new(api: T, options: SessionOptions, notifier: Arc<dyn Notifier>) -> Self {
        let mut reconciler = Reconciler::new(DeviceState::default());
        if options.auto_image {
            reconciler.set_auto_image(true);
        }

        let (effects_tx, effects_rx) = mpsc::unbounded_channel();
        let dispatcher = EffectDispatcher::new(effects_tx)
            .with(StatusProcessor)
            .with(NotificationProcessor::new(notifier, options.permission))
            .with(ImageProcessor)
            .attach(&mut reconciler);

        let (image, initial_load) = ImageRefreshController::new(&options.camera_url, now_ms());
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();

        Self {
            api,
            options,
            reconciler,
            image,
            initial_load: Some(initial_load),
            inputs_tx,
            inputs_rx,
            effects_rx,
            dispatcher,
            image_writer: None,
            background: Vec::new(),
        }
    }

    pub fn sender(&self) -> UnboundedSender<SessionInput> {
        self.inputs_tx.clone()
    }

    pub fn state(&self) -> &DeviceState {
        self.reconciler.state()
    }

    pub fn image_state(&self) -> &ImageState {
        self.image.state()
    }

    /// Process inputs until `Shutdown` or `quit`. Dropping the stream and
    /// aborting the timers on the way out is the unmount.
    pub async fn run(mut self, mut stream: EventStream) -> Self {
        self.start();
        let mut stream_open = true;
        loop {
            tokio::select! {
                biased;
                Some(effect) = self.effects_rx.recv() => self.handle_effect(effect),
                event = stream.next(), if stream_open => match event {
                    Some(event) => self.handle_stream_event(event),
                    None => {
                        warn!("Push channel ended");
                        stream_open = false;
                    }
                },
                Some(input) = self.inputs_rx.recv() => {
                    if !self.handle_input(input) {
                        break;
                    }
                }
            }
        }
        drop(stream);
        self.stop();
        self
    }

    fn start(&mut self) {
        self.spawn_status_fetch();
        if let Some(load) = self.initial_load.take() {
            self.spawn_image_load(load);
        }

        if let Some(period) = self.options.status_poll {
            let api = self.api.clone();
            let tx = self.inputs_tx.clone();
            self.background.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(period);
                tick.tick().await;
                loop {
                    tick.tick().await;
                    if tx.send(SessionInput::Status(api.get_status().await)).is_err() {
                        return;
                    }
                }
            }));
        }

        let tx = self.inputs_tx.clone();
        let period = self.options.image_refresh;
        self.background.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.tick().await;
            loop {
                tick.tick().await;
                if tx.send(SessionInput::ImageTick).is_err() {
                    return;
                }
            }
        }));
    }

    fn stop(&mut self) {
        self.reconciler.unsubscribe(self.dispatcher);
        self.image_writer = None;
        for task in self.background.drain(..) {
            task.abort();
        }
        info!("Session stopped");
    }

    /// Returns `false` once the session should stop.
    pub fn handle_input(&mut self, input: SessionInput) -> bool {
        match input {
            SessionInput::Command(command) => return self.handle_command(command),
            SessionInput::Status(Ok(snapshot)) => {
                self.reconciler.apply_snapshot(&snapshot);
            }
            SessionInput::Status(Err(e)) => warn!("Unable to fetch status: {}", e),
            SessionInput::ToggleSettled { ticket, result } => match result {
                Ok(confirmed) => {
                    let outcome = self.reconciler.confirm_toggle(ticket, confirmed);
                    debug!("{} confirmation: {:?}", ticket.control, outcome);
                }
                Err(e) => {
                    error!("{} request failed: {}", ticket.control, e);
                    self.reconciler.fail_toggle(ticket, &e);
                }
            },
            SessionInput::DoorToggleSettled(Ok(())) => debug!("Garage click accepted"),
            SessionInput::DoorToggleSettled(Err(e)) => error!("Garage click failed: {}", e),
            SessionInput::ImageTick => self.refresh_image(RefreshTrigger::Timer),
            SessionInput::ImageFetched { generation, result } => {
                if !self.image.is_loading(generation) {
                    debug!("Dropping superseded camera image {}", generation);
                    return true;
                }
                match result {
                    Ok(image) => self.store_image(generation, image),
                    Err(e) => {
                        self.image.finish(generation, Err(&e));
                    }
                }
            }
            SessionInput::ImageSettled { generation, result } => {
                if self.image.finish(generation, result.as_ref().map(|_| ())) && result.is_ok() {
                    debug!("Camera snapshot saved to {}", self.options.snapshot_path.display());
                }
            }
            SessionInput::Shutdown => return false,
        }
        true
    }

    pub fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => info!("Push channel connected"),
            StreamEvent::Message(raw) => {
                if let Err(e) = self.reconciler.apply_message(&raw) {
                    warn!("Dropping push message: {}", e);
                }
            }
            StreamEvent::Error(e) => warn!("Push channel error: {}", e),
        }
    }

    pub fn handle_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RefreshImage => self.refresh_image(RefreshTrigger::DoorChange),
        }
    }

    fn handle_command(&mut self, command: UserCommand) -> bool {
        match command {
            UserCommand::Door => {
                let api = self.api.clone();
                let tx = self.inputs_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(SessionInput::DoorToggleSettled(api.send_door_toggle().await));
                });
            }
            UserCommand::Toggle(control) => {
                if self.reconciler.has_pending(control) {
                    debug!("{} toggle already in flight, superseding it", control);
                }
                let ticket = self.reconciler.begin_toggle(control);
                let api = self.api.clone();
                let tx = self.inputs_tx.clone();
                tokio::spawn(async move {
                    let result = api.send_toggle(ticket.control, ticket.desired).await;
                    let _ = tx.send(SessionInput::ToggleSettled { ticket, result });
                });
            }
            UserCommand::AutoImage => {
                let enabled = !self.reconciler.state().auto_image_enabled;
                self.reconciler.set_auto_image(enabled);
            }
            UserCommand::RefreshImage => self.refresh_image(RefreshTrigger::Click),
            UserCommand::Status => {
                let pending: Vec<String> = Control::ALL
                    .iter()
                    .filter(|control| self.reconciler.has_pending(**control))
                    .map(|control| control.to_string())
                    .collect();
                info!(
                    "[rev {}] {} | image {:?} | pending [{}]",
                    self.state().revision,
                    StatusProcessor::render(self.state()),
                    self.image_state().phase,
                    pending.join(", ")
                );
            }
            UserCommand::Quit => return false,
        }
        true
    }

    fn refresh_image(&mut self, trigger: RefreshTrigger) {
        let auto_image = self.reconciler.state().auto_image_enabled;
        if let Some(load) = self.image.request(trigger, auto_image, now_ms()) {
            self.spawn_image_load(load);
        }
    }

    fn spawn_status_fetch(&self) {
        let api = self.api.clone();
        let tx = self.inputs_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(SessionInput::Status(api.get_status().await));
        });
    }

    fn spawn_image_load(&self, load: ImageLoad) {
        let api = self.api.clone();
        let tx = self.inputs_tx.clone();
        debug!("Loading camera image {}", load.uri);
        tokio::spawn(async move {
            let result = api.fetch_image(&load.uri).await;
            let _ = tx.send(SessionInput::ImageFetched {
                generation: load.generation,
                result,
            });
        });
    }

    /// Hand an accepted image to the snapshot writer. One writer stores
    /// images in acceptance order, so the file always ends on the newest.
    fn store_image(&mut self, generation: u64, image: Bytes) {
        if self.image_writer.is_none() {
            let (writer, mut images) = mpsc::unbounded_channel::<(u64, Bytes)>();
            let tx = self.inputs_tx.clone();
            let path = self.options.snapshot_path.clone();
            self.background.push(tokio::spawn(async move {
                while let Some((generation, image)) = images.recv().await {
                    let result = tokio::fs::write(&path, &image)
                        .await
                        .map_err(ImageLoadError::from);
                    if tx.send(SessionInput::ImageSettled { generation, result }).is_err() {
                        return;
                    }
                }
            }));
            self.image_writer = Some(writer);
        }
        if let Some(writer) = &self.image_writer
            && writer.send((generation, image)).is_err()
        {
            warn!("Snapshot writer is gone, dropping camera image {}", generation);
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
