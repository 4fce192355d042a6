//! End-to-end flows: the macro (serializer) and raw paths, in both
//! directions, over either protocol and either client flavor.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use iothub_device_client::{
    ConfirmationCallback, DeviceClient, DeviceClientLl, Message, MessageCallback, OptionValue,
    Protocol, OPTION_MINIMUM_POLLING_TIME,
};
use iothub_test_harness::{AccountInfo, HubTestClient, ListenSummary};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::callbacks::{
    confirmation_handler, macro_action_handler, model_message_handler, on_hub_event,
    raw_message_handler,
};
use crate::fixture::{ReceiveFixture, SendFixture};
use crate::model::{device_model, serialize_reading};
use crate::polling::{PollOutcome, PollingDriver};
use crate::suite::SuiteContext;
use crate::templates::MACRO_ACTION;
use crate::HarnessError;

/// Which client API drives the device side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFlavor {
    /// Background worker pumps I/O.
    Threaded,
    /// The scenario pumps `do_work` itself between checks.
    Pumped,
}

enum Device {
    Threaded(DeviceClient),
    Pumped(DeviceClientLl),
}

impl Device {
    async fn open(
        account: &AccountInfo,
        protocol: Protocol,
        flavor: ClientFlavor,
    ) -> Result<Self, HarnessError> {
        let config = account.client_config(protocol);
        let mut device = match flavor {
            ClientFlavor::Threaded => Device::Threaded(DeviceClient::create(config)?),
            ClientFlavor::Pumped => Device::Pumped(DeviceClientLl::create(config)?),
        };
        if protocol == Protocol::Http {
            device
                .set_option(OPTION_MINIMUM_POLLING_TIME, OptionValue::U64(0))
                .await?;
        }
        Ok(device)
    }

    async fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), HarnessError> {
        match self {
            Device::Threaded(client) => client.set_option(name, value).await?,
            Device::Pumped(client) => client.set_option(name, value)?,
        }
        Ok(())
    }

    async fn set_message_callback(
        &mut self,
        callback: MessageCallback,
    ) -> Result<(), HarnessError> {
        match self {
            Device::Threaded(client) => client.set_message_callback(callback).await?,
            Device::Pumped(client) => client.set_message_callback(callback)?,
        }
        Ok(())
    }

    async fn send_event(
        &mut self,
        message: Message,
        callback: ConfirmationCallback,
    ) -> Result<(), HarnessError> {
        match self {
            Device::Threaded(client) => client.send_event_async(message, Some(callback)).await?,
            Device::Pumped(client) => client.send_event_async(message, Some(callback))?,
        }
        Ok(())
    }

    async fn wait_until<F>(
        &mut self,
        polling: PollingDriver,
        ceiling: Duration,
        wake: &Notify,
        check: F,
    ) -> Result<PollOutcome, HarnessError>
    where
        F: FnMut() -> Result<bool, HarnessError>,
    {
        match self {
            Device::Threaded(_) => polling.wait_for(ceiling, wake, check).await,
            Device::Pumped(client) => polling.wait_for_pumped(ceiling, client, check).await,
        }
    }

    async fn destroy(self) {
        match self {
            Device::Threaded(client) => client.destroy().await,
            Device::Pumped(client) => client.destroy().await,
        }
    }
}

/// Cloud pushes a command; the serializer dispatches it to the model action,
/// which must see this case's timestamp and id.
pub async fn macro_receive(
    suite: &SuiteContext,
    protocol: Protocol,
    flavor: ClientFlavor,
) -> Result<()> {
    let case = suite.begin_case().await;
    let fixture = Arc::new(suite.factory().macro_receive_fixture(case.unique_id()));
    info!(unique_id = case.unique_id(), ?protocol, ?flavor, "macro receive");
    deliver_to_model(suite, &fixture, protocol, flavor).await
}

/// Cloud pushes a plain payload; the device must receive it byte for byte.
pub async fn raw_receive(
    suite: &SuiteContext,
    protocol: Protocol,
    flavor: ClientFlavor,
) -> Result<()> {
    let case = suite.begin_case().await;
    let fixture = Arc::new(suite.factory().receive_fixture(case.unique_id()));
    info!(unique_id = case.unique_id(), ?protocol, ?flavor, "raw receive");

    push_to_device(suite, &fixture).await?;

    let mut device = Device::open(suite.account(), protocol, flavor).await?;
    let callback = raw_message_handler(Arc::clone(&fixture));
    let result = await_delivery(suite, &mut device, &fixture, callback).await;
    device.destroy().await;
    result
}

/// Device serializes a populated model and sends it; the listener must read
/// back exactly the expected text.
pub async fn macro_send(
    suite: &SuiteContext,
    protocol: Protocol,
    flavor: ClientFlavor,
) -> Result<()> {
    let case = suite.begin_case().await;
    let timestamp = suite.factory().timestamp();
    let fixture = Arc::new(suite.factory().macro_send_fixture(&timestamp, case.unique_id()));
    info!(unique_id = case.unique_id(), ?protocol, ?flavor, "macro send");

    let mut instance = device_model()?;
    let payload = serialize_reading(&mut instance, &timestamp, case.unique_id())?;
    send_and_drain(suite, &fixture, Message::from_bytes(payload), protocol, flavor).await
}

/// Device sends the plain template; no serializer involved.
pub async fn raw_send(
    suite: &SuiteContext,
    protocol: Protocol,
    flavor: ClientFlavor,
) -> Result<()> {
    let case = suite.begin_case().await;
    let fixture = Arc::new(suite.factory().send_fixture(case.unique_id()));
    info!(unique_id = case.unique_id(), ?protocol, ?flavor, "raw send");

    let message = Message::from_string(fixture.expected());
    send_and_drain(suite, &fixture, message, protocol, flavor).await
}

pub async fn amqp_macro_recv(suite: &SuiteContext) -> Result<()> {
    macro_receive(suite, Protocol::Amqp, ClientFlavor::Threaded).await
}

pub async fn amqp_macro_send(suite: &SuiteContext) -> Result<()> {
    macro_send(suite, Protocol::Amqp, ClientFlavor::Threaded).await
}

pub async fn http_macro_recv(suite: &SuiteContext) -> Result<()> {
    macro_receive(suite, Protocol::Http, ClientFlavor::Pumped).await
}

pub async fn http_macro_send(suite: &SuiteContext) -> Result<()> {
    macro_send(suite, Protocol::Http, ClientFlavor::Pumped).await
}

/// Drains every partition for up to the drain time, stopping at the first
/// event matching `fixture`.
pub async fn drain_for(suite: &SuiteContext, fixture: &SendFixture) -> Result<ListenSummary> {
    let mut hub = HubTestClient::initialize(suite.account()).context("hub test client init")?;
    let summary = hub
        .listen_for_event_for_max_drain_time(
            suite.account().partition_count,
            &suite.config().listen_options(),
            |event| on_hub_event(fixture, event),
        )
        .await
        .context("listening for device event")?;
    hub.deinit();
    Ok(summary)
}

async fn push_to_device(suite: &SuiteContext, fixture: &ReceiveFixture) -> Result<()> {
    let hub = HubTestClient::initialize(suite.account()).context("hub test client init")?;
    hub.send_message(fixture.outbound().as_bytes())
        .await
        .context("sending cloud-to-device message")?;
    hub.deinit();
    Ok(())
}

async fn await_delivery(
    suite: &SuiteContext,
    device: &mut Device,
    fixture: &ReceiveFixture,
    callback: MessageCallback,
) -> Result<()> {
    device.set_message_callback(callback).await?;
    let outcome = device
        .wait_until(
            suite.polling(),
            suite.max_cloud_travel_time(),
            fixture.wake(),
            || fixture.was_found(),
        )
        .await?;
    if outcome == PollOutcome::TimedOut {
        warn!(unique_id = fixture.unique_id(), "device never saw the message");
    }
    ensure!(
        fixture.was_found()?,
        "was_found never became true for unique id {}",
        fixture.unique_id()
    );
    Ok(())
}

/// Pushes `fixture`'s outbound payload, then opens a device whose model
/// action reports into `fixture` and waits one cloud travel time for it.
pub async fn deliver_to_model(
    suite: &SuiteContext,
    fixture: &Arc<ReceiveFixture>,
    protocol: Protocol,
    flavor: ClientFlavor,
) -> Result<()> {
    push_to_device(suite, fixture).await?;

    let mut instance = device_model()?;
    instance.on_action(MACRO_ACTION, macro_action_handler(Arc::clone(fixture)))?;

    let mut device = Device::open(suite.account(), protocol, flavor).await?;
    let callback = model_message_handler(Arc::new(instance));
    let result = await_delivery(suite, &mut device, fixture, callback).await;
    device.destroy().await;
    result
}

/// Sends `message` from a fresh device, waits for its confirmation, then
/// drains the hub for an event equal to `fixture`'s expected payload.
pub async fn send_and_drain(
    suite: &SuiteContext,
    fixture: &Arc<SendFixture>,
    message: Message,
    protocol: Protocol,
    flavor: ClientFlavor,
) -> Result<()> {
    let mut device = Device::open(suite.account(), protocol, flavor).await?;
    let result = confirm_and_drain(suite, &mut device, fixture, message).await;
    device.destroy().await;
    result
}

async fn confirm_and_drain(
    suite: &SuiteContext,
    device: &mut Device,
    fixture: &Arc<SendFixture>,
    message: Message,
) -> Result<()> {
    device
        .send_event(message, confirmation_handler(Arc::clone(fixture)))
        .await?;
    device
        .wait_until(
            suite.polling(),
            suite.max_cloud_travel_time(),
            fixture.wake(),
            || fixture.data_was_sent(),
        )
        .await?;
    ensure!(
        fixture.data_was_sent()?,
        "data_was_sent never became true for unique id {}",
        fixture.unique_id()
    );

    let summary = drain_for(suite, fixture).await?;
    info!(
        unique_id = fixture.unique_id(),
        matched = summary.matched,
        events_seen = summary.events_seen,
        "drain finished"
    );
    ensure!(
        fixture.was_found()?,
        "was_found never became true for unique id {}",
        fixture.unique_id()
    );
    Ok(())
}
