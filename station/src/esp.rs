use std::{cell::RefCell, rc::Rc, thread, time::Duration};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::Read,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use epd_waveshare::{epd2in9_v2::Epd2in9, prelude::WaveshareDisplay};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::{Delay, FreeRtos},
    gpio::{
        AnyIOPin, Gpio21, Gpio3, Gpio35, Gpio36, Gpio5, Gpio6, Gpio7, Gpio8, Input, Output,
        PinDriver,
    },
    modem::Modem,
    spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig, SPI2},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::prelude::Peripherals,
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{BlockingWifi, EspWifi},
};
use log::{error, info, warn};

use weather_common::{
    config::scale_light, render, run_cycle, AdafruitIo, Device, DeviceError, HttpTransport,
    IconAtlas, OpenWeather, Phase, RuntimeConfig, Screen, Secrets, SleepPlan, TransportError,
};

use crate::assets::bundled_atlas;

const NVS_NAMESPACE: &str = "weather";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const MAX_HTTP_BODY: usize = 96 * 1024;
const HTTP_CHUNK_SIZE: usize = 1024;

/// Full-scale reading of the S2's 13-bit one-shot ADC.
const ADC_FULL_SCALE: u16 = 8_191;

type Panel = Epd2in9<
    SpiDeviceDriver<'static, SpiDriver<'static>>,
    PinDriver<'static, Gpio5, Input>,
    PinDriver<'static, Gpio7, Output>,
    PinDriver<'static, Gpio6, Output>,
    Delay,
>;

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

/// Station link brought up on the first request of a cycle, so a dark wake
/// never powers the radio.
struct WifiLink {
    wifi: BlockingWifi<EspWifi<'static>>,
    ssid: String,
    password: String,
    connected: bool,
}

struct EspTransport {
    link: Rc<RefCell<WifiLink>>,
    timeout: Duration,
    client: Option<HttpClient<EspHttpConnection>>,
}

/// E-paper wiring, held untouched until the first refresh of a cycle so a
/// dark wake never resets the panel.
struct PanelPins {
    spi: SPI2,
    sclk: Gpio36,
    sdo: Gpio35,
    cs: Gpio8,
    busy: Gpio5,
    dc: Gpio7,
    rst: Gpio6,
}

struct PanelLink {
    spi: SpiDeviceDriver<'static, SpiDriver<'static>>,
    epd: Panel,
}

struct EspDevice<'d> {
    sensor_power: PinDriver<'d, Gpio21, Output>,
    light: AdcChannelDriver<'d, Gpio3, &'d AdcDriver<'d, ADC1>>,
    settle_ms: u32,
    panel_pins: Option<PanelPins>,
    panel: Option<PanelLink>,
    delay: Delay,
    atlas: IconAtlas,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    ensure_secret_defaults(&mut runtime.secrets);
    runtime.sanitize();

    let plan = match wake(&runtime, sys_loop, nvs_partition) {
        Ok(plan) => plan,
        Err(err) => {
            error!("wake cycle failed phase={} error={err:#}", Phase::Setup);
            SleepPlan::failed(Phase::Setup, &runtime.station)
        }
    };

    deep_sleep(plan.duration);
    Ok(())
}

fn wake(
    runtime: &RuntimeConfig,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
) -> anyhow::Result<SleepPlan> {
    let station = &runtime.station;
    let secrets = &runtime.secrets;
    secrets.validate().context("secrets are incomplete")?;
    if !secrets.has_wifi_credentials() {
        return Err(anyhow!("wifi credentials missing"));
    }

    let Peripherals {
        modem,
        pins,
        adc1,
        spi2,
        ..
    } = Peripherals::take()?;

    let link = Rc::new(RefCell::new(WifiLink::new(
        modem,
        sys_loop,
        nvs_partition,
        secrets,
    )?));
    let timeout = Duration::from_secs(station.http_timeout_secs);

    let mut forecast = OpenWeather::new(
        EspTransport::new(link.clone(), timeout),
        station,
        &secrets.openweather_key,
    )
    .context("invalid forecast endpoint")?;
    let mut feeds = AdafruitIo::new(
        EspTransport::new(link.clone(), timeout),
        &station.aio_url,
        &secrets.aio_username,
        &secrets.aio_key,
    );

    let adc = AdcDriver::new(adc1)?;
    let light = AdcChannelDriver::new(
        &adc,
        pins.gpio3,
        &AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        },
    )?;

    let mut sensor_power = PinDriver::output(pins.gpio21)?;
    sensor_power.set_high()?;

    let mut device = EspDevice {
        sensor_power,
        light,
        settle_ms: station.light_settle_ms.try_into().unwrap_or(u32::MAX),
        panel_pins: Some(PanelPins {
            spi: spi2,
            sclk: pins.gpio36,
            sdo: pins.gpio35,
            cs: pins.gpio8,
            busy: pins.gpio5,
            dc: pins.gpio7,
            rst: pins.gpio6,
        }),
        panel: None,
        delay: Delay::new_default(),
        atlas: bundled_atlas().unwrap_or_else(|err| {
            warn!("bundled icons unusable: {err}");
            IconAtlas::default()
        }),
    };

    let plan = run_cycle(&mut device, &mut forecast, &mut feeds, station);
    link.borrow_mut().shutdown();
    Ok(plan)
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 4096];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

fn ensure_secret_defaults(secrets: &mut Secrets) {
    let defaults = [
        (&mut secrets.ssid, option_env!("WIFI_SSID")),
        (&mut secrets.password, option_env!("WIFI_PASS")),
        (&mut secrets.aio_username, option_env!("AIO_USERNAME")),
        (&mut secrets.aio_key, option_env!("AIO_KEY")),
        (&mut secrets.openweather_key, option_env!("OPENWEATHER_KEY")),
    ];

    for (value, fallback) in defaults {
        match fallback {
            Some(fallback) if value.is_empty() => *value = fallback.to_string(),
            _ => {}
        }
    }
}

impl WifiLink {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
        secrets: &Secrets,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;

        Ok(Self {
            wifi: BlockingWifi::wrap(esp_wifi, sys_loop)?,
            ssid: secrets.ssid.clone(),
            password: secrets.password.clone(),
            connected: false,
        })
    }

    fn ensure_connected(&mut self) -> anyhow::Result<()> {
        if self.connected {
            return Ok(());
        }

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: self
                    .ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi ssid too long"))?,
                password: self
                    .password
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi password too long"))?,
                auth_method,
                ..Default::default()
            }))?;

        self.wifi.start()?;
        info!("wifi started, connecting to `{}`", self.ssid);

        let mut last_err = None;
        for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
            info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
            match self.wifi.connect().and_then(|()| self.wifi.wait_netif_up()) {
                Ok(()) => {
                    info!("wifi connected and netif up on attempt {attempt}");
                    self.connected = true;
                    return Ok(());
                }
                Err(err) => {
                    warn!("wifi connect failed on attempt {attempt}: {err:#}");
                    last_err = Some(err);
                }
            }

            if attempt < WIFI_CONNECT_ATTEMPTS {
                let _ = self.wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            }
        }

        let _ = self.wifi.stop();
        match last_err {
            Some(err) => Err(anyhow::Error::from(err)
                .context(format!("all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed"))),
            None => Err(anyhow!("wifi never attempted a connection")),
        }
    }

    fn shutdown(&mut self) {
        if self.connected {
            let _ = self.wifi.disconnect();
            let _ = self.wifi.stop();
            self.connected = false;
        }
    }
}

impl EspTransport {
    fn new(link: Rc<RefCell<WifiLink>>, timeout: Duration) -> Self {
        Self {
            link,
            timeout,
            client: None,
        }
    }

    fn client(&mut self) -> anyhow::Result<&mut HttpClient<EspHttpConnection>> {
        self.link.borrow_mut().ensure_connected()?;

        if self.client.is_none() {
            let http_conf = HttpClientConfiguration {
                timeout: Some(self.timeout),
                crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                ..Default::default()
            };
            self.client = Some(HttpClient::wrap(EspHttpConnection::new(&http_conf)?));
        }

        self.client
            .as_mut()
            .ok_or_else(|| anyhow!("http client unavailable"))
    }
}

impl HttpTransport for EspTransport {
    fn get(&mut self, url: &str, headers: &[(&str, &str)]) -> Result<String, TransportError> {
        let request_error = |reason: String| TransportError::Request {
            url: url.to_string(),
            reason,
        };

        let client = self.client().map_err(|err| request_error(format!("{err:#}")))?;
        let request = client
            .request(Method::Get, url, headers)
            .map_err(|err| request_error(format!("{err:?}")))?;
        let mut response = request
            .submit()
            .map_err(|err| request_error(format!("{err:?}")))?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(TransportError::Status {
                url: url.to_string(),
                status,
            });
        }

        let mut body = Vec::new();
        let mut chunk = [0_u8; HTTP_CHUNK_SIZE];
        loop {
            let read = response
                .read(&mut chunk)
                .map_err(|err| request_error(format!("{err:?}")))?;
            if read == 0 {
                break;
            }
            if body.len() + read > MAX_HTTP_BODY {
                return Err(request_error(format!(
                    "response exceeds {MAX_HTTP_BODY} bytes"
                )));
            }
            body.extend_from_slice(&chunk[..read]);
        }

        String::from_utf8(body).map_err(|err| request_error(err.to_string()))
    }
}

impl Device for EspDevice<'_> {
    fn read_ambient_light(&mut self) -> Result<u16, DeviceError> {
        // The sensor rail is active low.
        self.sensor_power
            .set_low()
            .map_err(|err| DeviceError::new(format!("light sensor power on: {err}")))?;
        FreeRtos::delay_ms(self.settle_ms);

        let raw = self.light.read_raw();
        if let Err(err) = self.sensor_power.set_high() {
            warn!("failed to power down light sensor: {err}");
        }

        let raw = raw.map_err(|err| DeviceError::new(format!("light sensor read: {err}")))?;
        Ok(scale_light(raw, ADC_FULL_SCALE))
    }

    fn present(&mut self, screen: &Screen) -> Result<(), DeviceError> {
        // The panel scans along its 128px edge.
        let frame = render(screen, &self.atlas).rotated_clockwise();
        let buffer = frame.to_packed(false);

        let delay = &mut self.delay;
        let panel = Self::panel(&mut self.panel, &mut self.panel_pins, delay)?;
        panel
            .epd
            .update_and_display_frame(&mut panel.spi, &buffer, delay)
            .map_err(|err| DeviceError::new(format!("panel refresh failed: {err:?}")))?;
        panel
            .epd
            .sleep(&mut panel.spi, delay)
            .map_err(|err| DeviceError::new(format!("panel sleep failed: {err:?}")))?;
        Ok(())
    }
}

impl EspDevice<'_> {
    /// Brings up the SPI bus and resets the panel on first use.
    fn panel<'a>(
        panel: &'a mut Option<PanelLink>,
        pins: &mut Option<PanelPins>,
        delay: &mut Delay,
    ) -> Result<&'a mut PanelLink, DeviceError> {
        if panel.is_none() {
            let pins = pins
                .take()
                .ok_or_else(|| DeviceError::new("panel pins already claimed"))?;
            *panel = Some(PanelLink::init(pins, delay)?);
        }

        panel
            .as_mut()
            .ok_or_else(|| DeviceError::new("panel unavailable"))
    }
}

impl PanelLink {
    fn init(pins: PanelPins, delay: &mut Delay) -> Result<Self, DeviceError> {
        let hal_error =
            |err: esp_idf_svc::sys::EspError| DeviceError::new(format!("panel io: {err}"));

        let mut spi = SpiDeviceDriver::new_single(
            pins.spi,
            pins.sclk,
            pins.sdo,
            Option::<AnyIOPin>::None,
            Some(pins.cs),
            &SpiDriverConfig::new(),
            &SpiConfig::new().baudrate(4.MHz().into()),
        )
        .map_err(hal_error)?;
        let epd = Epd2in9::new(
            &mut spi,
            PinDriver::input(pins.busy).map_err(hal_error)?,
            PinDriver::output(pins.dc).map_err(hal_error)?,
            PinDriver::output(pins.rst).map_err(hal_error)?,
            delay,
            None,
        )
        .map_err(|err| DeviceError::new(format!("e-paper init failed: {err:?}")))?;

        Ok(Self { spi, epd })
    }
}

fn deep_sleep(duration: Duration) {
    info!("entering deep sleep for {}s", duration.as_secs());
    unsafe { esp_idf_svc::sys::esp_deep_sleep(duration.as_micros() as u64) };
}
