//! Common fixtures shared by tests.

/// Model runs used across tests, as (year, month, day, cycle).
pub mod runs {
    pub const GFS_PREVIOUS: (i32, u32, u32, u32) = (2024, 3, 14, 6);
    pub const GFS_LATEST: (i32, u32, u32, u32) = (2024, 3, 14, 12);
    pub const HRRR_LATEST: (i32, u32, u32, u32) = (2024, 3, 14, 15);

    /// GFS cycles published per day.
    pub const GFS_CYCLES: [u32; 4] = [0, 6, 12, 18];
}

/// Upstream directory listings in the shape NOMADS serves them.
pub mod listings {
    pub const GFS_ROOT: &str = r#"<html><body><h1>Index of /pub/data/nccf/com/gfs/prod</h1>
<a href="gfs.2024031318/">gfs.2024031318/</a> 13-Mar-2024 21:30 -
<a href="gfs.2024031400/">gfs.2024031400/</a> 14-Mar-2024 03:30 -
<a href="gfs.2024031406/">gfs.2024031406/</a> 14-Mar-2024 09:30 -
<a href="gfs.2024031412/">gfs.2024031412/</a> 14-Mar-2024 15:30 -
<a href="gdas.20240314/">gdas.20240314/</a> 14-Mar-2024 15:30 -
</body></html>"#;

    pub const HRRR_ROOT: &str = r#"<html><body>
<a href="hrrr.20240313/">hrrr.20240313/</a> 13-Mar-2024 23:59 -
<a href="hrrr.20240314/">hrrr.20240314/</a> 14-Mar-2024 16:10 -
</body></html>"#;

    pub const HRRR_DAY: &str = r#"<html><body>
<a href="hrrr.t14z.wrfsfcf00.grib2">hrrr.t14z.wrfsfcf00.grib2</a>
<a href="hrrr.t14z.wrfsfcf01.grib2">hrrr.t14z.wrfsfcf01.grib2</a>
<a href="hrrr.t15z.wrfsfcf00.grib2">hrrr.t15z.wrfsfcf00.grib2</a>
<a href="hrrr.t15z.wrfsfcf00.grib2.idx">hrrr.t15z.wrfsfcf00.grib2.idx</a>
</body></html>"#;
}
