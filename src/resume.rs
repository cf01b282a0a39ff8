//! Stage-1 resume file codec.
//!
//! A resume file is a text file of records, one per line, each a
//! sequence of `TAG=VALUE;` fields. Blank lines and `#` comments are
//! skipped; CR, LF and CRLF line ends are all accepted. Records with a
//! bad checksum or missing mandatory fields are skipped silently and
//! parsing continues with the next line.
//!
//! Legacy Prime95 v22 lines (a `QX=` field, no `METHOD=`) are accepted
//! as ECM records.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, Read, Seek, SeekFrom, Write},
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use tracing::warn;

// ======================================================================
// CONST - PUBLIC

/// Checksum modulus: the largest prime below 2^32.
pub const CHECKSUM_MOD: u64 = 4294967291;

// ======================================================================
// Method - PUBLIC

/// Factoring method a record belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    /// Elliptic curve method.
    Ecm,
    /// Pollard P−1.
    PMinus1,
    /// Williams P+1.
    PPlus1,
}

impl Method {
    fn tag(self) -> &'static str {
        match self {
            Method::Ecm => "ECM",
            Method::PMinus1 => "P-1",
            Method::PPlus1 => "P+1",
        }
    }
}

// ======================================================================
// ResumeRecord - PUBLIC

/// One parsed resume-file record.
#[derive(Clone, Debug)]
pub struct ResumeRecord {
    /// Factoring method.
    pub method: Method,
    /// Stage-1 residue, reduced mod `n`.
    pub x: BigUint,
    /// Optional second coordinate, reduced mod `n`.
    pub y: Option<BigUint>,
    /// The number being factored.
    pub n: BigUint,
    /// Symbolic form of `n` when the file carried an expression.
    pub n_expr: Option<String>,
    /// ECM sigma parameter (zero when absent).
    pub sigma: BigUint,
    /// ECM curve `A` parameter (zero when absent).
    pub a: BigUint,
    /// ECM parametrization; defaults to 0 (Suyama).
    pub param: i32,
    /// Curve type; defaults to 1 (Montgomery).
    pub etype: i32,
    /// Stage-1 bound.
    pub b1: f64,
    /// Initial point, when recorded.
    pub x0: Option<BigUint>,
    /// Initial second coordinate, when recorded.
    pub y0: Option<BigUint>,
    /// Writing program.
    pub program: String,
    /// `user@host` stamp.
    pub who: String,
    /// Timestamp text.
    pub time: String,
    /// Free-form comment.
    pub comment: String,
    /// A factor of `n` discovered while normalizing a `Z` coordinate.
    pub factor_found: Option<BigUint>,
}

// ======================================================================
// WriteRecord - PUBLIC

/// Data for one record to append.
#[derive(Clone, Debug)]
pub struct WriteRecord {
    /// Factoring method.
    pub method: Method,
    /// Stage-1 bound reached.
    pub b1: f64,
    /// ECM sigma, or the curve `A` when `sigma_is_a` is set.
    pub sigma: BigUint,
    /// `sigma` holds the curve `A` parameter.
    pub sigma_is_a: bool,
    /// Curve type written with `A`.
    pub etype: i32,
    /// Parametrization; `−1` omits the `PARAM` field.
    pub param: i32,
    /// Stage-1 residue.
    pub x: BigUint,
    /// Optional second coordinate.
    pub y: Option<BigUint>,
    /// The number being factored.
    pub n: BigUint,
    /// Symbolic form of `n` to write instead of its decimal digits.
    pub n_expr: Option<String>,
    /// Optional initial point.
    pub x0: Option<BigUint>,
    /// Optional initial second coordinate.
    pub y0: Option<BigUint>,
    /// Writing program name and version.
    pub program: String,
    /// Free-form comment; empty writes nothing.
    pub comment: String,
}

// ======================================================================
// FUNCTIONS - PUBLIC - reading

/// Reads the next complete, checksum-valid record.
///
/// Returns `Ok(None)` at end of file. Malformed lines are skipped.
pub fn read_resume_line<R: BufRead>(reader: &mut R) -> io::Result<Option<ResumeRecord>> {
    loop {
        let line = match read_logical_line(reader)? {
            Some(line) => line,
            None => return Ok(None),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match parse_line(trimmed) {
            Some(record) => return Ok(Some(record)),
            None => {
                warn!(line = trimmed, "skipping malformed resume line");
                continue;
            }
        }
    }
}

/// Reads one line, accepting LF, CRLF and bare CR endings.
fn read_logical_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut out = Vec::new();
    let mut saw_any = false;
    loop {
        let mut byte = [0u8; 1];
        match reader.read(&mut byte)? {
            0 => {
                if saw_any {
                    break;
                }
                return Ok(None);
            }
            _ => {
                saw_any = true;
                match byte[0] {
                    b'\n' => break,
                    b'\r' => {
                        // Consume a following LF if present.
                        let buf = reader.fill_buf()?;
                        if buf.first() == Some(&b'\n') {
                            reader.consume(1);
                        }
                        break;
                    }
                    other => out.push(other),
                }
            }
        }
    }
    Ok(Some(String::from_utf8_lossy(&out).into_owned()))
}

struct Fields {
    method: Option<Method>,
    x: Option<BigUint>,
    y: Option<BigUint>,
    z: Option<BigUint>,
    qx: Option<BigUint>,
    x0: Option<BigUint>,
    y0: Option<BigUint>,
    n: Option<BigUint>,
    n_expr: Option<String>,
    sigma: Option<BigUint>,
    a: Option<BigUint>,
    param: i32,
    etype: i32,
    b1: Option<f64>,
    checksum: Option<u64>,
    program: String,
    who: String,
    time: String,
    comment: String,
}

fn parse_line(line: &str) -> Option<ResumeRecord> {
    let mut fields = Fields {
        method: None,
        x: None,
        y: None,
        z: None,
        qx: None,
        x0: None,
        y0: None,
        n: None,
        n_expr: None,
        sigma: None,
        a: None,
        param: 0,
        etype: 1,
        b1: None,
        checksum: None,
        program: String::new(),
        who: String::new(),
        time: String::new(),
        comment: String::new(),
    };

    let mut rest = line;
    while !rest.is_empty() {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let eq = rest.find('=')?;
        let tag = &rest[..eq];
        rest = &rest[eq + 1..];

        // Fields end at ';'; legacy Prime95 triples have none and
        // end at whitespace instead.
        let (value, tail) = match rest.find(';') {
            Some(semi) => (&rest[..semi], &rest[semi + 1..]),
            None => match rest.find(char::is_whitespace) {
                Some(ws) => (&rest[..ws], &rest[ws + 1..]),
                None => (rest, ""),
            },
        };
        let value = value.trim();
        rest = tail;

        match tag {
            "METHOD" => {
                fields.method = Some(match value {
                    "ECM" => Method::Ecm,
                    "P-1" => Method::PMinus1,
                    "P+1" => Method::PPlus1,
                    _ => return None,
                });
            }
            "X" => fields.x = Some(parse_number(value)?),
            "Y" => fields.y = Some(parse_number(value)?),
            "Z" => fields.z = Some(parse_number(value)?),
            "QX" => fields.qx = Some(parse_number(value)?),
            "X0" => fields.x0 = Some(parse_number(value)?),
            "Y0" => fields.y0 = Some(parse_number(value)?),
            "CHECKSUM" => fields.checksum = Some(value.parse().ok()?),
            "COMMENT" => fields.comment = value.to_string(),
            "N" => {
                let n = eval_expression(value)?;
                if n.parse_was_symbolic {
                    fields.n_expr = Some(value.to_string());
                }
                fields.n = n.value.to_biguint();
            }
            "SIGMA" => fields.sigma = Some(parse_number(value)?),
            "PARAM" => fields.param = value.parse().ok()?,
            "ETYPE" => fields.etype = value.parse().ok()?,
            "A" => fields.a = Some(parse_number(value)?),
            "B1" => fields.b1 = Some(value.parse().ok()?),
            "PROGRAM" => fields.program = value.to_string(),
            "WHO" => fields.who = value.to_string(),
            "TIME" => fields.time = value.to_string(),
            _ => return None,
        }
    }

    // Legacy Prime95 v22 lines: QX with N and SIGMA, no METHOD.
    if let Some(qx) = fields.qx {
        let n = fields.n?;
        let sigma = fields.sigma?;
        return Some(ResumeRecord {
            method: Method::Ecm,
            x: qx.mod_floor(&n),
            y: None,
            n,
            n_expr: fields.n_expr,
            sigma,
            a: BigUint::zero(),
            param: fields.param,
            etype: fields.etype,
            b1: fields.b1.unwrap_or(1.0),
            x0: fields.x0,
            y0: fields.y0,
            program: "Prime95".to_string(),
            who: fields.who,
            time: fields.time,
            comment: fields.comment,
            factor_found: None,
        });
    }

    let method = fields.method?;
    let x = fields.x?;
    let n = fields.n?;
    let b1 = fields.b1?;
    if method == Method::Ecm && fields.sigma.is_none() && fields.a.is_none() {
        return None;
    }

    if let Some(saved) = fields.checksum {
        let mut acc = (b1 as u64) % CHECKSUM_MOD;
        if let Some(sigma) = &fields.sigma {
            acc = acc * (sigma % CHECKSUM_MOD).to_u64().unwrap() % CHECKSUM_MOD;
        }
        if let Some(a) = &fields.a {
            acc = acc * (a % CHECKSUM_MOD).to_u64().unwrap() % CHECKSUM_MOD;
        }
        acc = acc * (&n % CHECKSUM_MOD).to_u64().unwrap() % CHECKSUM_MOD;
        acc = acc * (&x % CHECKSUM_MOD).to_u64().unwrap() % CHECKSUM_MOD;
        if let Some(z) = &fields.z {
            acc = acc * (z % CHECKSUM_MOD).to_u64().unwrap() % CHECKSUM_MOD;
        }
        acc = acc * ((fields.param as u64 + 1) % CHECKSUM_MOD) % CHECKSUM_MOD;
        if acc != saved {
            warn!(saved, computed = acc, "resume line has bad checksum");
            return None;
        }
    }

    let mut x = x.mod_floor(&n);
    let y = fields.y.map(|y| y.mod_floor(&n));
    let mut factor_found = None;

    if let Some(z) = fields.z {
        // Normalize projective X/Z; a non-invertible Z exposes a
        // factor of n.
        match mod_inverse(&z, &n) {
            Some(inv) => x = (x * inv).mod_floor(&n),
            None => factor_found = Some(z.gcd(&n)),
        }
    }

    Some(ResumeRecord {
        method,
        x,
        y,
        n,
        n_expr: fields.n_expr,
        sigma: fields.sigma.unwrap_or_else(BigUint::zero),
        a: fields.a.unwrap_or_else(BigUint::zero),
        param: fields.param,
        etype: fields.etype,
        b1,
        x0: fields.x0,
        y0: fields.y0,
        program: fields.program,
        who: fields.who,
        time: fields.time,
        comment: fields.comment,
        factor_found,
    })
}

/// Decimal, or hexadecimal with an `0x` prefix.
fn parse_number(value: &str) -> Option<BigUint> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        BigUint::parse_bytes(hex.as_bytes(), 16)
    } else {
        BigUint::parse_bytes(value.as_bytes(), 10)
    }
}

fn mod_inverse(z: &BigUint, n: &BigUint) -> Option<BigUint> {
    let egcd = BigInt::from(z.clone()).extended_gcd(&BigInt::from(n.clone()));
    if !egcd.gcd.is_one() {
        return None;
    }
    egcd.x.mod_floor(&BigInt::from(n.clone())).to_biguint()
}

// ======================================================================
// FUNCTIONS - PUBLIC - writing

/// Appends one record, under an advisory write lock where available.
pub fn write_resume_line(path: &Path, record: &WriteRecord) -> io::Result<()> {
    let mut line = String::new();
    let mut checksum = (record.b1 as u64) % CHECKSUM_MOD;

    line.push_str("METHOD=");
    line.push_str(record.method.tag());
    if record.method == Method::Ecm {
        if !record.sigma_is_a {
            if record.param != -1 {
                line.push_str(&format!("; PARAM={}", record.param));
            }
            line.push_str("; SIGMA=");
        } else {
            line.push_str(&format!("; ETYPE={}; A=", record.etype));
        }
        line.push_str(&record.sigma.to_string());
        checksum = checksum * (&record.sigma % CHECKSUM_MOD).to_u64().unwrap() % CHECKSUM_MOD;
        if record.param != -1 {
            checksum = checksum * ((record.param as u64 + 1) % CHECKSUM_MOD) % CHECKSUM_MOD;
        }
    }

    line.push_str(&format!("; B1={:.0}; N=", record.b1));
    match &record.n_expr {
        Some(expr) => line.push_str(expr),
        None => line.push_str(&record.n.to_string()),
    }
    let x = record.x.mod_floor(&record.n);
    line.push_str(&format!("; X=0x{:x}", x));
    checksum = checksum * (&record.n % CHECKSUM_MOD).to_u64().unwrap() % CHECKSUM_MOD;
    checksum = checksum * (&x % CHECKSUM_MOD).to_u64().unwrap() % CHECKSUM_MOD;
    line.push_str(&format!(
        "; CHECKSUM={}; PROGRAM={};",
        checksum, record.program
    ));

    if let Some(y) = &record.y {
        line.push_str(&format!(" Y=0x{:x};", y.mod_floor(&record.n)));
    }
    if let Some(x0) = &record.x0 {
        line.push_str(&format!(" X0=0x{:x};", x0));
    }
    if let Some(y0) = &record.y0 {
        line.push_str(&format!(" Y0=0x{:x};", y0));
    }

    let who = who_stamp();
    if !who.is_empty() {
        line.push_str(&format!(" WHO={};", who));
    }
    if !record.comment.is_empty() {
        line.push_str(&format!(" COMMENT={};", record.comment));
    }
    line.push_str(&format!(" TIME={};", time_stamp()));
    line.push('\n');

    exclusive_append(path, line.as_bytes())
}

/// Appends bytes to a file, holding a blocking `fcntl` write lock on
/// byte 0 on Unix so concurrent writers interleave whole lines.
pub fn exclusive_append(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        lock_byte0(fd, libc::F_WRLCK as libc::c_short)?;
        file.seek(SeekFrom::End(0))?;
        let result = file.write_all(bytes).and_then(|_| file.flush());
        let _ = lock_byte0(fd, libc::F_UNLCK as libc::c_short);
        result
    }

    #[cfg(not(unix))]
    {
        file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;
        file.flush()
    }
}

#[cfg(unix)]
fn lock_byte0(fd: std::os::unix::io::RawFd, kind: libc::c_short) -> io::Result<()> {
    // Some fcntl implementations dislike garbage in unused fields.
    let mut lock: libc::flock = unsafe { std::mem::zeroed() };
    lock.l_type = kind;
    lock.l_whence = libc::SEEK_SET as libc::c_short;
    lock.l_start = 0;
    lock.l_len = 1;
    // SAFETY: fd is a valid open descriptor; F_SETLKW blocks until
    // the lock is granted.
    let r = unsafe { libc::fcntl(fd, libc::F_SETLKW, &lock) };
    if r != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn who_stamp() -> String {
    let user = std::env::var("LOGNAME")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let host = hostname();
    if user.is_empty() && host.is_empty() {
        String::new()
    } else {
        format!("{}@{}", user, host)
    }
}

fn hostname() -> String {
    #[cfg(unix)]
    {
        let mut buf = [0u8; 256];
        // SAFETY: buf is a valid writable buffer of the given length.
        let r = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
        if r == 0 {
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            return String::from_utf8_lossy(&buf[..end]).into_owned();
        }
        String::new()
    }
    #[cfg(not(unix))]
    {
        std::env::var("HOSTNAME").unwrap_or_default()
    }
}

/// `ctime`-style UTC timestamp: `Thu Jan  1 00:00:00 1970`.
fn time_stamp() -> String {
    const DAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = secs / 86400;
    let tod = secs % 86400;
    let weekday = DAYS[(days % 7) as usize];

    // Civil date from the day count.
    let mut year = 1970u64;
    let mut remaining = days;
    loop {
        let leap = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
        let len = if leap { 366 } else { 365 };
        if remaining < len {
            break;
        }
        remaining -= len;
        year += 1;
    }
    let leap = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
    let month_lens = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut month = 0;
    while remaining >= month_lens[month] {
        remaining -= month_lens[month];
        month += 1;
    }

    format!(
        "{} {} {:2} {:02}:{:02}:{:02} {}",
        weekday,
        MONTHS[month],
        remaining + 1,
        tod / 3600,
        tod % 3600 / 60,
        tod % 60,
        year
    )
}

// ======================================================================
// FUNCTIONS - PUBLIC - batch-s files

/// Writes the batch exponent (the product of primes up to B1) in GMP
/// raw format: a 4-byte big-endian byte count, then the magnitude
/// most-significant-byte first.
pub fn write_s_file(path: &Path, s: &BigUint) -> io::Result<usize> {
    let bytes = s.to_bytes_be();
    let mut file = File::create(path)?;
    file.write_all(&(bytes.len() as u32).to_be_bytes())?;
    file.write_all(&bytes)?;
    Ok(4 + bytes.len())
}

/// Reads a batch exponent and validates it against `b1`:
/// the 2-adic valuation must match `⌊log2 B1⌋`, `next_prime(B1)` must
/// not divide it, and `next_prime(⌊√B1⌋)` must divide it exactly once.
pub fn read_s_file(path: &Path, b1: f64) -> io::Result<BigUint> {
    let mut file = File::open(path)?;
    let mut len_bytes = [0u8; 4];
    file.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut bytes = vec![0u8; len];
    file.read_exact(&mut bytes)?;
    let s = BigUint::from_bytes_be(&bytes);
    if s.is_zero() {
        return Err(invalid_s(b1));
    }

    // Valuation of 2 must match B1.
    let val2 = s.trailing_zeros().unwrap_or(0);
    let lo = 2f64.powi(val2 as i32);
    if lo > b1 || lo * 2.0 <= b1 {
        return Err(invalid_s(b1));
    }

    // next_prime(B1) must not divide s.
    let p = next_prime(b1 as u64);
    if (&s % p).is_zero() {
        return Err(invalid_s(b1));
    }

    // next_prime(√B1) must divide s exactly once.
    let q = next_prime(b1.sqrt() as u64);
    if !(&s % q).is_zero() || (&s % (q * q)).is_zero() {
        return Err(invalid_s(b1));
    }

    Ok(s)
}

fn invalid_s(b1: f64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("batch product does not correspond to B1={:.0}", b1),
    )
}

// ======================================================================
// FUNCTIONS - CRATE - primes

/// Deterministic Miller-Rabin for u64.
pub(crate) fn is_prime_u64(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut r = 0;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }

    'witness: for a in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        let mut x = pow_mod_u64(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 0..r - 1 {
            x = mul_mod_u64(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Smallest prime strictly greater than `n`.
pub(crate) fn next_prime(n: u64) -> u64 {
    let mut candidate = n + 1;
    while !is_prime_u64(candidate) {
        candidate += 1;
    }
    candidate
}

fn mul_mod_u64(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod_u64(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut acc = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod_u64(acc, base, m);
        }
        base = mul_mod_u64(base, base, m);
        exp >>= 1;
    }
    acc
}

// ======================================================================
// Expression evaluator - PRIVATE
//
// The N field may hold a symbolic form such as `2^127-1`; the original
// feeds it through its full expression evaluator. Supported here:
// integers, + − * / ^ and parentheses.

struct EvaluatedN {
    value: BigInt,
    parse_was_symbolic: bool,
}

fn eval_expression(text: &str) -> Option<EvaluatedN> {
    let bytes: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if bytes.is_empty() {
        return None;
    }
    let mut parser = ExprParser {
        bytes: &bytes,
        pos: 0,
    };
    let value = parser.sum()?;
    if parser.pos != bytes.len() {
        return None;
    }
    let symbolic = !bytes.iter().all(|b| b.is_ascii_digit());
    Some(EvaluatedN {
        value,
        parse_was_symbolic: symbolic,
    })
}

struct ExprParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn sum(&mut self) -> Option<BigInt> {
        let mut acc = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            if op == b'+' {
                acc += rhs;
            } else {
                acc -= rhs;
            }
        }
        Some(acc)
    }

    fn term(&mut self) -> Option<BigInt> {
        let mut acc = self.power()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.power()?;
            if op == b'*' {
                acc *= rhs;
            } else {
                if rhs.is_zero() {
                    return None;
                }
                acc /= rhs;
            }
        }
        Some(acc)
    }

    fn power(&mut self) -> Option<BigInt> {
        let base = self.atom()?;
        if self.peek() == Some(b'^') {
            self.pos += 1;
            // Right associative.
            let exp = self.power()?;
            let exp = exp.to_u32()?;
            return Some(base.pow(exp));
        }
        Some(base)
    }

    fn atom(&mut self) -> Option<BigInt> {
        match self.peek()? {
            b'(' => {
                self.pos += 1;
                let inner = self.sum()?;
                if self.peek() != Some(b')') {
                    return None;
                }
                self.pos += 1;
                Some(inner)
            }
            b'-' => {
                self.pos += 1;
                Some(-self.atom()?)
            }
            b'0'..=b'9' => {
                let start = self.pos;
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
                BigInt::parse_bytes(&self.bytes[start..self.pos], 10)
            }
            _ => None,
        }
    }
}

// ======================================================================
// TESTS
