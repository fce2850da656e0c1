//! Stub headers for hardware libraries.
//!
//! Each stub declares the classes and functions lessons use with empty
//! bodies, which is enough for the compiler to type-check a sketch. Includes
//! that are not in [`STUB_HEADERS`] are left for the compiler to report.

use once_cell::sync::Lazy;
use regex::Regex;

#[allow(clippy::expect_used)]
static INCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*#\s*include\s*[<"]([^>"]+)[>"]"#).expect("include pattern is valid")
});

/// A header file synthesized into the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubHeader {
    /// File name as written in `#include`.
    pub name: &'static str,
    /// Header source.
    pub source: &'static str,
}

const SERVO: &str = r"#pragma once
#include <Arduino.h>

class Servo {
public:
  Servo() {}
  uint8_t attach(int pin) { return 0; }
  uint8_t attach(int pin, int min, int max) { return 0; }
  void detach() {}
  void write(int value) {}
  void writeMicroseconds(int value) {}
  int read() { return 0; }
  int readMicroseconds() { return 0; }
  bool attached() { return false; }
};
";

const DHT: &str = r"#pragma once
#include <Arduino.h>

#define DHT11 11
#define DHT12 12
#define DHT21 21
#define DHT22 22
#define AM2301 21

class DHT {
public:
  DHT(uint8_t pin, uint8_t type, uint8_t count = 6) {}
  void begin(uint8_t usec = 55) {}
  float readTemperature(bool isFahrenheit = false, bool force = false) { return 0; }
  float readHumidity(bool force = false) { return 0; }
  float convertCtoF(float c) { return c * 1.8 + 32; }
  float convertFtoC(float f) { return (f - 32) * 0.55555; }
  float computeHeatIndex(float temperature, float percentHumidity, bool isFahrenheit = true) { return 0; }
};
";

const LIQUID_CRYSTAL_I2C: &str = r"#pragma once
#include <Arduino.h>

class LiquidCrystal_I2C : public Print {
public:
  LiquidCrystal_I2C(uint8_t addr, uint8_t cols, uint8_t rows) {}
  void init() {}
  void begin(uint8_t cols = 16, uint8_t rows = 2) {}
  void clear() {}
  void home() {}
  void backlight() {}
  void noBacklight() {}
  void display() {}
  void noDisplay() {}
  void cursor() {}
  void noCursor() {}
  void blink() {}
  void noBlink() {}
  void setCursor(uint8_t col, uint8_t row) {}
  void createChar(uint8_t location, uint8_t charmap[]) {}
  size_t write(uint8_t value) override { return 1; }
  using Print::write;
};
";

const ADAFRUIT_NEOPIXEL: &str = r"#pragma once
#include <Arduino.h>

#define NEO_RGB 0x06
#define NEO_GRB 0x52
#define NEO_RGBW 0x1B
#define NEO_GRBW 0xD2
#define NEO_KHZ800 0x0000
#define NEO_KHZ400 0x0100

class Adafruit_NeoPixel {
public:
  Adafruit_NeoPixel(uint16_t n, int16_t pin = 6, uint16_t type = NEO_GRB + NEO_KHZ800) {}
  Adafruit_NeoPixel() {}
  void begin() {}
  void show() {}
  void clear() {}
  void setBrightness(uint8_t brightness) {}
  void setPixelColor(uint16_t n, uint32_t c) {}
  void setPixelColor(uint16_t n, uint8_t r, uint8_t g, uint8_t b) {}
  void setPixelColor(uint16_t n, uint8_t r, uint8_t g, uint8_t b, uint8_t w) {}
  void fill(uint32_t c = 0, uint16_t first = 0, uint16_t count = 0) {}
  uint32_t getPixelColor(uint16_t n) const { return 0; }
  uint16_t numPixels() const { return 0; }
  static uint32_t Color(uint8_t r, uint8_t g, uint8_t b) {
    return ((uint32_t)r << 16) | ((uint32_t)g << 8) | b;
  }
  static uint32_t Color(uint8_t r, uint8_t g, uint8_t b, uint8_t w) {
    return ((uint32_t)w << 24) | ((uint32_t)r << 16) | ((uint32_t)g << 8) | b;
  }
  static uint32_t ColorHSV(uint16_t hue, uint8_t sat = 255, uint8_t val = 255) { return 0; }
};
";

const ONE_WIRE: &str = r"#pragma once
#include <Arduino.h>

class OneWire {
public:
  OneWire() {}
  OneWire(uint8_t pin) {}
  void begin(uint8_t pin) {}
  uint8_t reset() { return 0; }
  void select(const uint8_t rom[8]) {}
  void skip() {}
  void write(uint8_t v, uint8_t power = 0) {}
  uint8_t read() { return 0; }
  void reset_search() {}
  bool search(uint8_t *newAddr, bool search_mode = true) { return false; }
  static uint8_t crc8(const uint8_t *addr, uint8_t len) { return 0; }
};
";

const DALLAS_TEMPERATURE: &str = r"#pragma once
#include <Arduino.h>

#define DEVICE_DISCONNECTED_C -127
#define DEVICE_DISCONNECTED_F -196.6

typedef uint8_t DeviceAddress[8];

class OneWire;

class DallasTemperature {
public:
  DallasTemperature() {}
  DallasTemperature(OneWire *wire) {}
  void begin() {}
  void requestTemperatures() {}
  float getTempCByIndex(uint8_t index) { return 0; }
  float getTempFByIndex(uint8_t index) { return 0; }
  float getTempC(const uint8_t *address) { return 0; }
  uint8_t getDeviceCount() { return 0; }
  bool getAddress(uint8_t *address, uint8_t index) { return false; }
  void setResolution(uint8_t bits) {}
};
";

const IR_REMOTE: &str = r"#pragma once
#include <Arduino.h>

#define ENABLE_LED_FEEDBACK true
#define DISABLE_LED_FEEDBACK false

struct IRData {
  uint8_t protocol;
  uint16_t address;
  uint16_t command;
  uint32_t decodedRawData;
  uint8_t flags;
};

struct decode_results {
  unsigned long value;
  int decode_type;
  int bits;
};

class IRrecv {
public:
  IRrecv() {}
  IRrecv(uint8_t pin) {}
  void begin(uint8_t pin, bool enableLEDFeedback = false) {}
  void enableIRIn() {}
  bool decode() { return false; }
  bool decode(decode_results *results) { return false; }
  void resume() {}
  void printIRResultShort(Print *printer) {}
  IRData decodedIRData;
};

static IRrecv IrReceiver;
";

/// Headers that get a stub when a sketch includes them.
pub const STUB_HEADERS: &[StubHeader] = &[
    StubHeader { name: "Servo.h", source: SERVO },
    StubHeader { name: "DHT.h", source: DHT },
    StubHeader { name: "LiquidCrystal_I2C.h", source: LIQUID_CRYSTAL_I2C },
    StubHeader { name: "Adafruit_NeoPixel.h", source: ADAFRUIT_NEOPIXEL },
    StubHeader { name: "OneWire.h", source: ONE_WIRE },
    StubHeader { name: "DallasTemperature.h", source: DALLAS_TEMPERATURE },
    StubHeader { name: "IRremote.h", source: IR_REMOTE },
    StubHeader { name: "IRremote.hpp", source: IR_REMOTE },
];

/// Looks up the stub for an include name.
#[must_use]
pub fn find_stub(name: &str) -> Option<&'static StubHeader> {
    STUB_HEADERS.iter().find(|stub| stub.name == name)
}

/// Returns every `#include` target in `code`, in order, without duplicates.
#[must_use]
pub fn included_headers(code: &str) -> Vec<&str> {
    let mut headers: Vec<&str> = Vec::new();
    for captures in INCLUDE_RE.captures_iter(code) {
        if let Some(name) = captures.get(1).map(|m| m.as_str().trim()) {
            if !headers.contains(&name) {
                headers.push(name);
            }
        }
    }
    headers
}

/// Returns the stubs needed by the includes in `code`.
#[must_use]
pub fn stubs_for(code: &str) -> Vec<&'static StubHeader> {
    included_headers(code)
        .into_iter()
        .filter_map(find_stub)
        .collect()
}
