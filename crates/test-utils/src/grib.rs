//! Synthetic GRIB2 message builder.
//!
//! Produces structurally valid GRIB2 Edition 2 messages (grid template 3.0 or
//! 3.30, product template 4.0, simple packing 5.0) so decoders can be tested
//! without downloading model output.

/// Build a minimal GRIB2 message with the specified parameters
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    grid: GridTemplate,
    scanning_mode: u8,
    // Product definition
    param_category: u8,
    param_number: u8,
    surface_type: u8,
    surface_scale: u8,
    surface_value: u32,
    forecast_hour: u32,
    // Data
    data_values: Vec<f32>,
}

#[derive(Debug, Clone)]
enum GridTemplate {
    /// Template 3.0, angles in microdegrees
    LatLon {
        ni: u32,
        nj: u32,
        la1: i32,
        lo1: i32,
        la2: i32,
        lo2: i32,
        di: u32,
        dj: u32,
    },
    /// Template 3.30, angles in microdegrees, spacing in millimetres
    Lambert {
        nx: u32,
        ny: u32,
        la1: i32,
        lo1: i32,
        lov: i32,
        latin: i32,
        dx: u32,
        dy: u32,
    },
}

impl GridTemplate {
    fn num_points(&self) -> u32 {
        match self {
            GridTemplate::LatLon { ni, nj, .. } => ni * nj,
            GridTemplate::Lambert { nx, ny, .. } => nx * ny,
        }
    }
}

impl Grib2Builder {
    /// A 10x10, 1-degree surface temperature field over the western US,
    /// scanned north to south.
    pub fn new_gfs() -> Self {
        Self {
            discipline: 0,
            center: 7, // NCEP
            year: 2024,
            month: 3,
            day: 14,
            hour: 12,
            grid: GridTemplate::LatLon {
                ni: 10,
                nj: 10,
                la1: 45_000_000,
                lo1: 230_000_000,
                la2: 36_000_000,
                lo2: 239_000_000,
                di: 1_000_000,
                dj: 1_000_000,
            },
            scanning_mode: 0x00,
            param_category: 0,
            param_number: 0, // TMP
            surface_type: 1,
            surface_scale: 0,
            surface_value: 0,
            forecast_hour: 0,
            data_values: vec![288.15; 100],
        }
    }

    /// A 3x4 Lambert conformal CAPE field anchored at the HRRR first grid
    /// point, scanned south to north.
    pub fn new_hrrr() -> Self {
        let mut builder = Self::new_gfs();
        builder.grid = GridTemplate::Lambert {
            nx: 4,
            ny: 3,
            la1: 21_138_123,
            lo1: 237_280_472,
            lov: 262_500_000,
            latin: 38_500_000,
            dx: 3_000_000,
            dy: 3_000_000,
        };
        builder.scanning_mode = 0x40;
        builder.param_category = 7;
        builder.param_number = 6;
        builder.data_values = vec![0.0; 12];
        builder
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    /// Regular lat/lon grid. `la1`/`lo1` is the first point in scan order.
    pub fn with_lat_lon_grid(
        mut self,
        ni: u32,
        nj: u32,
        la1: f64,
        lo1: f64,
        di: f64,
        dj: f64,
    ) -> Self {
        let south_to_north = self.scanning_mode & 0x40 != 0;
        let la2 = if south_to_north {
            la1 + dj * (nj - 1) as f64
        } else {
            la1 - dj * (nj - 1) as f64
        };
        self.grid = GridTemplate::LatLon {
            ni,
            nj,
            la1: (la1 * 1e6).round() as i32,
            lo1: (lo1 * 1e6).round() as i32,
            la2: (la2 * 1e6).round() as i32,
            lo2: ((lo1 + di * (ni - 1) as f64) * 1e6).round() as i32,
            di: (di * 1e6).round() as u32,
            dj: (dj * 1e6).round() as u32,
        };
        self.data_values = vec![0.0; (ni * nj) as usize];
        self
    }

    /// Global 0..360 grid at `step` degrees, first row at 90N.
    pub fn with_global_grid(self, step: f64) -> Self {
        let ni = (360.0 / step).round() as u32;
        let nj = (180.0 / step).round() as u32 + 1;
        self.with_scanning_mode(0x00)
            .with_lat_lon_grid(ni, nj, 90.0, 0.0, step, step)
    }

    /// Set scanning mode flags. Call before `with_lat_lon_grid`.
    pub fn with_scanning_mode(mut self, mode: u8) -> Self {
        self.scanning_mode = mode;
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_surface(mut self, surface_type: u8, value: u32) -> Self {
        self.surface_type = surface_type;
        self.surface_scale = 0;
        self.surface_value = value;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; self.grid.num_points() as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = self.grid.num_points() as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    /// Values in scan order.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let sections = [
            self.build_section1(),
            self.build_section3(),
            self.build_section4(),
            self.build_section5(),
            self.build_section6(),
            self.build_section7(),
        ];
        let message_length = 16 + sections.iter().map(Vec::len).sum::<usize>() + 4;

        let mut message = Vec::with_capacity(message_length);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]); // Reserved
        message.push(self.discipline);
        message.push(2); // Edition 2
        message.extend_from_slice(&(message_length as u64).to_be_bytes());
        for section in &sections {
            message.extend_from_slice(section);
        }
        message.extend_from_slice(b"7777");

        message
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);

        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(1); // Significance of reference time (start of forecast)

        section.extend_from_slice(&self.year.to_be_bytes());
        section.push(self.month);
        section.push(self.day);
        section.push(self.hour);
        section.push(0); // Minute
        section.push(0); // Second

        section.push(0); // Production status (operational)
        section.push(1); // Type of data (forecast)

        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(0); // Source of grid definition
        body.extend_from_slice(&self.grid.num_points().to_be_bytes());
        body.push(0); // Octets for optional list
        body.push(0); // Interpretation of optional list

        match &self.grid {
            GridTemplate::LatLon {
                ni,
                nj,
                la1,
                lo1,
                la2,
                lo2,
                di,
                dj,
            } => {
                body.extend_from_slice(&0u16.to_be_bytes());
                push_earth_shape(&mut body);
                body.extend_from_slice(&ni.to_be_bytes());
                body.extend_from_slice(&nj.to_be_bytes());
                body.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
                body.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // Subdivisions
                body.extend_from_slice(&encode_signed(*la1));
                body.extend_from_slice(&encode_signed(*lo1));
                body.push(48); // Resolution and component flags
                body.extend_from_slice(&encode_signed(*la2));
                body.extend_from_slice(&encode_signed(*lo2));
                body.extend_from_slice(&di.to_be_bytes());
                body.extend_from_slice(&dj.to_be_bytes());
                body.push(self.scanning_mode);
            }
            GridTemplate::Lambert {
                nx,
                ny,
                la1,
                lo1,
                lov,
                latin,
                dx,
                dy,
            } => {
                body.extend_from_slice(&30u16.to_be_bytes());
                push_earth_shape(&mut body);
                body.extend_from_slice(&nx.to_be_bytes());
                body.extend_from_slice(&ny.to_be_bytes());
                body.extend_from_slice(&encode_signed(*la1));
                body.extend_from_slice(&encode_signed(*lo1));
                body.push(8); // Resolution and component flags
                body.extend_from_slice(&encode_signed(*latin)); // LaD
                body.extend_from_slice(&encode_signed(*lov));
                body.extend_from_slice(&dx.to_be_bytes());
                body.extend_from_slice(&dy.to_be_bytes());
                body.push(0); // Projection centre flag
                body.push(self.scanning_mode);
                body.extend_from_slice(&encode_signed(*latin)); // Latin1
                body.extend_from_slice(&encode_signed(*latin)); // Latin2
                body.extend_from_slice(&encode_signed(-90_000_000)); // South pole lat
                body.extend_from_slice(&0u32.to_be_bytes()); // South pole lon
            }
        }

        with_header(3, body)
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_be_bytes()); // Number of coordinate values
        body.extend_from_slice(&0u16.to_be_bytes()); // Product definition template (0)

        body.push(self.param_category);
        body.push(self.param_number);
        body.push(2); // Type of generating process (forecast)
        body.push(0); // Background generating process
        body.push(0); // Analysis or forecast process
        body.extend_from_slice(&0u16.to_be_bytes()); // Hours of cutoff
        body.push(0); // Minutes of cutoff
        body.push(1); // Time range unit (hours)
        body.extend_from_slice(&self.forecast_hour.to_be_bytes());

        body.push(self.surface_type);
        body.push(self.surface_scale);
        body.extend_from_slice(&self.surface_value.to_be_bytes());

        body.push(255); // Type of second fixed surface (none)
        body.push(0);
        body.extend_from_slice(&0u32.to_be_bytes());

        with_header(4, body)
    }

    fn build_section5(&self) -> Vec<u8> {
        let packing = self.packing();

        let mut body = Vec::new();
        body.extend_from_slice(&self.grid.num_points().to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0
        body.extend_from_slice(&packing.reference.to_be_bytes());
        body.extend_from_slice(&encode_signed_i16(packing.binary_scale));
        body.extend_from_slice(&0u16.to_be_bytes()); // Decimal scale factor
        body.push(packing.bits);
        body.push(0); // Original field type (floating point)

        with_header(5, body)
    }

    fn build_section6(&self) -> Vec<u8> {
        with_header(6, vec![255]) // No bitmap
    }

    fn build_section7(&self) -> Vec<u8> {
        let packing = self.packing();
        let mut body = Vec::new();

        if packing.bits > 0 {
            let scale = 2.0_f64.powi(packing.binary_scale as i32);
            for &val in &self.data_values {
                let packed = ((val as f64 - packing.reference as f64) / scale).round();
                body.extend_from_slice(&(packed.clamp(0.0, 65535.0) as u16).to_be_bytes());
            }
        }

        with_header(7, body)
    }

    /// 16-bit packing with E = ceil(log2(range / 65535)).
    fn packing(&self) -> Packing {
        let (min_val, max_val) = self
            .data_values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
                (min.min(v), max.max(v))
            });
        let range = (max_val - min_val) as f64;

        if range == 0.0 {
            return Packing {
                reference: min_val,
                binary_scale: 0,
                bits: 0,
            };
        }

        Packing {
            reference: min_val,
            binary_scale: (range / 65535.0).log2().ceil() as i16,
            bits: 16,
        }
    }
}

struct Packing {
    reference: f32,
    binary_scale: i16,
    bits: u8,
}

fn with_header(number: u8, body: Vec<u8>) -> Vec<u8> {
    let mut section = Vec::with_capacity(body.len() + 5);
    section.extend_from_slice(&((body.len() + 5) as u32).to_be_bytes());
    section.push(number);
    section.extend_from_slice(&body);
    section
}

fn push_earth_shape(body: &mut Vec<u8>) {
    body.push(6); // Spherical earth, radius 6371229 m
    body.push(0);
    body.extend_from_slice(&0u32.to_be_bytes());
    body.push(0);
    body.extend_from_slice(&0u32.to_be_bytes());
    body.push(0);
    body.extend_from_slice(&0u32.to_be_bytes());
}

/// GRIB2 sign-magnitude encoding of a 4-byte integer.
pub fn encode_signed(value: i32) -> [u8; 4] {
    let magnitude = value.unsigned_abs() & 0x7FFF_FFFF;
    let raw = if value < 0 {
        magnitude | 0x8000_0000
    } else {
        magnitude
    };
    raw.to_be_bytes()
}

fn encode_signed_i16(value: i16) -> [u8; 2] {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    let raw = if value < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}

/// Concatenate messages into one multi-field payload.
pub fn concat_messages(messages: &[Vec<u8>]) -> Vec<u8> {
    messages.concat()
}
