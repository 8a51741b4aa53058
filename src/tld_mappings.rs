use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Catch-all Whois server; answers with a `refer:` line pointing at the
/// authoritative registry.
pub const IANA_WHOIS: &str = "whois.iana.org";

/// Public RDAP redirector, used as the trailing candidate for number resources.
pub const RDAP_REDIRECTOR: &str = "https://rdap.org/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rir {
    Arin,
    Ripe,
    Apnic,
    Lacnic,
    Afrinic,
}

impl Rir {
    pub fn whois_server(&self) -> &'static str {
        match self {
            Rir::Arin => "whois.arin.net",
            Rir::Ripe => "whois.ripe.net",
            Rir::Apnic => "whois.apnic.net",
            Rir::Lacnic => "whois.lacnic.net",
            Rir::Afrinic => "whois.afrinic.net",
        }
    }

    pub fn rdap_base(&self) -> &'static str {
        match self {
            Rir::Arin => "https://rdap.arin.net/registry/",
            Rir::Ripe => "https://rdap.db.ripe.net/",
            Rir::Apnic => "https://rdap.apnic.net/",
            Rir::Lacnic => "https://rdap.lacnic.net/rdap/",
            Rir::Afrinic => "https://rdap.afrinic.net/rdap/",
        }
    }
}

// Authoritative Whois servers per registry suffix. Multi-label suffixes win
// over their parent TLD through longest-suffix matching.
pub static WHOIS_TLD_SERVERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();

    // Legacy gTLDs
    map.insert("com", "whois.verisign-grs.com");
    map.insert("net", "whois.verisign-grs.com");
    map.insert("org", "whois.pir.org");
    map.insert("info", "whois.afilias.net");
    map.insert("biz", "whois.nic.biz");
    map.insert("name", "whois.nic.name");
    map.insert("mobi", "whois.nic.mobi");
    map.insert("asia", "whois.nic.asia");
    map.insert("tel", "whois.nic.tel");
    map.insert("pro", "whois.nic.pro");
    map.insert("coop", "whois.nic.coop");
    map.insert("aero", "whois.aero");
    map.insert("jobs", "whois.nic.jobs");
    map.insert("edu", "whois.educause.edu");
    map.insert("gov", "whois.nic.gov");
    map.insert("int", "whois.iana.org");

    // New gTLDs
    map.insert("xyz", "whois.nic.xyz");
    map.insert("top", "whois.nic.top");
    map.insert("shop", "whois.nic.shop");
    map.insert("online", "whois.nic.online");
    map.insert("store", "whois.nic.store");
    map.insert("site", "whois.nic.site");
    map.insert("app", "whois.nic.google");
    map.insert("dev", "whois.nic.google");
    map.insert("page", "whois.nic.google");
    map.insert("tech", "whois.nic.tech");
    map.insert("blog", "whois.nic.blog");
    map.insert("club", "whois.nic.club");
    map.insert("live", "whois.nic.live");
    map.insert("cloud", "whois.nic.cloud");

    // ccTLDs
    map.insert("uk", "whois.nic.uk");
    map.insert("co.uk", "whois.nic.uk");
    map.insert("org.uk", "whois.nic.uk");
    map.insert("me.uk", "whois.nic.uk");
    map.insert("de", "whois.denic.de");
    map.insert("fr", "whois.nic.fr");
    map.insert("it", "whois.nic.it");
    map.insert("es", "whois.nic.es");
    map.insert("nl", "whois.domain-registry.nl");
    map.insert("be", "whois.dns.be");
    map.insert("ch", "whois.nic.ch");
    map.insert("at", "whois.nic.at");
    map.insert("se", "whois.iis.se");
    map.insert("no", "whois.norid.no");
    map.insert("dk", "whois.punktum.dk");
    map.insert("fi", "whois.fi");
    map.insert("pl", "whois.dns.pl");
    map.insert("cz", "whois.nic.cz");
    map.insert("eu", "whois.eu");
    map.insert("io", "whois.nic.io");
    map.insert("co", "whois.nic.co");
    map.insert("me", "whois.nic.me");
    map.insert("tv", "whois.nic.tv");
    map.insert("us", "whois.nic.us");
    map.insert("ca", "whois.cira.ca");
    map.insert("au", "whois.auda.org.au");
    map.insert("com.au", "whois.auda.org.au");
    map.insert("nz", "whois.irs.net.nz");
    map.insert("jp", "whois.jprs.jp");
    map.insert("co.jp", "whois.jprs.jp");
    map.insert("kr", "whois.kr");
    map.insert("cn", "whois.cnnic.cn");
    map.insert("com.cn", "whois.cnnic.cn");
    map.insert("in", "whois.registry.in");
    map.insert("br", "whois.registro.br");
    map.insert("com.br", "whois.registro.br");
    map.insert("ru", "whois.tcinet.ru");

    map
});

// RDAP base URLs per registry suffix, in preference order.
pub static RDAP_TLD_SERVERS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert("com", vec!["https://rdap.verisign.com/com/v1/"]);
    map.insert("net", vec!["https://rdap.verisign.com/net/v1/"]);
    map.insert("org", vec!["https://rdap.publicinterestregistry.org/rdap/"]);
    map.insert("info", vec!["https://rdap.identitydigital.services/rdap/"]);
    map.insert("biz", vec!["https://rdap.nic.biz/"]);
    map.insert("xyz", vec!["https://rdap.centralnic.com/xyz/"]);
    map.insert("app", vec!["https://pubapi.registry.google/rdap/"]);
    map.insert("dev", vec!["https://pubapi.registry.google/rdap/"]);
    map.insert("page", vec!["https://pubapi.registry.google/rdap/"]);
    map.insert("io", vec!["https://rdap.identitydigital.services/rdap/"]);
    map.insert("uk", vec!["https://rdap.nominet.uk/uk/"]);
    map.insert("fr", vec!["https://rdap.nic.fr/"]);
    map.insert("nl", vec!["https://rdap.sidn.nl/"]);
    map.insert("cz", vec!["https://rdap.nic.cz/"]);
    map.insert("br", vec!["https://rdap.registro.br/"]);
    map.insert("au", vec!["https://rdap.cctld.au/rdap/"]);

    map
});

// IPv4 allocations by /8 (and a few finer blocks) from the IANA registry.
pub static IPV4_ALLOCATIONS: &[(&str, Rir)] = &[
    ("1.0.0.0/8", Rir::Apnic),
    ("2.0.0.0/8", Rir::Ripe),
    ("3.0.0.0/8", Rir::Arin),
    ("4.0.0.0/8", Rir::Arin),
    ("5.0.0.0/8", Rir::Ripe),
    ("8.0.0.0/8", Rir::Arin),
    ("14.0.0.0/8", Rir::Apnic),
    ("23.0.0.0/8", Rir::Arin),
    ("24.0.0.0/8", Rir::Arin),
    ("27.0.0.0/8", Rir::Apnic),
    ("31.0.0.0/8", Rir::Ripe),
    ("36.0.0.0/8", Rir::Apnic),
    ("37.0.0.0/8", Rir::Ripe),
    ("41.0.0.0/8", Rir::Afrinic),
    ("42.0.0.0/8", Rir::Apnic),
    ("46.0.0.0/8", Rir::Ripe),
    ("49.0.0.0/8", Rir::Apnic),
    ("50.0.0.0/8", Rir::Arin),
    ("54.0.0.0/8", Rir::Arin),
    ("58.0.0.0/8", Rir::Apnic),
    ("59.0.0.0/8", Rir::Apnic),
    ("60.0.0.0/8", Rir::Apnic),
    ("61.0.0.0/8", Rir::Apnic),
    ("62.0.0.0/8", Rir::Ripe),
    ("63.0.0.0/8", Rir::Arin),
    ("64.0.0.0/8", Rir::Arin),
    ("65.0.0.0/8", Rir::Arin),
    ("66.0.0.0/8", Rir::Arin),
    ("67.0.0.0/8", Rir::Arin),
    ("68.0.0.0/8", Rir::Arin),
    ("69.0.0.0/8", Rir::Arin),
    ("70.0.0.0/8", Rir::Arin),
    ("71.0.0.0/8", Rir::Arin),
    ("72.0.0.0/8", Rir::Arin),
    ("73.0.0.0/8", Rir::Arin),
    ("74.0.0.0/8", Rir::Arin),
    ("75.0.0.0/8", Rir::Arin),
    ("76.0.0.0/8", Rir::Arin),
    ("77.0.0.0/8", Rir::Ripe),
    ("78.0.0.0/8", Rir::Ripe),
    ("79.0.0.0/8", Rir::Ripe),
    ("80.0.0.0/8", Rir::Ripe),
    ("81.0.0.0/8", Rir::Ripe),
    ("82.0.0.0/8", Rir::Ripe),
    ("83.0.0.0/8", Rir::Ripe),
    ("84.0.0.0/8", Rir::Ripe),
    ("85.0.0.0/8", Rir::Ripe),
    ("86.0.0.0/8", Rir::Ripe),
    ("87.0.0.0/8", Rir::Ripe),
    ("88.0.0.0/8", Rir::Ripe),
    ("89.0.0.0/8", Rir::Ripe),
    ("90.0.0.0/8", Rir::Ripe),
    ("91.0.0.0/8", Rir::Ripe),
    ("92.0.0.0/8", Rir::Ripe),
    ("93.0.0.0/8", Rir::Ripe),
    ("94.0.0.0/8", Rir::Ripe),
    ("95.0.0.0/8", Rir::Ripe),
    ("96.0.0.0/8", Rir::Arin),
    ("97.0.0.0/8", Rir::Arin),
    ("98.0.0.0/8", Rir::Arin),
    ("99.0.0.0/8", Rir::Arin),
    ("100.0.0.0/8", Rir::Arin),
    ("101.0.0.0/8", Rir::Apnic),
    ("102.0.0.0/8", Rir::Afrinic),
    ("103.0.0.0/8", Rir::Apnic),
    ("104.0.0.0/8", Rir::Arin),
    ("105.0.0.0/8", Rir::Afrinic),
    ("106.0.0.0/8", Rir::Apnic),
    ("107.0.0.0/8", Rir::Arin),
    ("108.0.0.0/8", Rir::Arin),
    ("109.0.0.0/8", Rir::Ripe),
    ("110.0.0.0/7", Rir::Apnic),
    ("112.0.0.0/5", Rir::Apnic),
    ("120.0.0.0/6", Rir::Apnic),
    ("142.0.0.0/8", Rir::Arin),
    ("151.0.0.0/8", Rir::Ripe),
    ("154.0.0.0/8", Rir::Afrinic),
    ("162.0.0.0/8", Rir::Arin),
    ("168.0.0.0/8", Rir::Arin),
    ("173.0.0.0/8", Rir::Arin),
    ("174.0.0.0/8", Rir::Arin),
    ("175.0.0.0/8", Rir::Apnic),
    ("176.0.0.0/8", Rir::Ripe),
    ("177.0.0.0/8", Rir::Lacnic),
    ("178.0.0.0/8", Rir::Ripe),
    ("179.0.0.0/8", Rir::Lacnic),
    ("180.0.0.0/8", Rir::Apnic),
    ("181.0.0.0/8", Rir::Lacnic),
    ("182.0.0.0/7", Rir::Apnic),
    ("184.0.0.0/8", Rir::Arin),
    ("185.0.0.0/8", Rir::Ripe),
    ("186.0.0.0/7", Rir::Lacnic),
    ("188.0.0.0/8", Rir::Ripe),
    ("189.0.0.0/8", Rir::Lacnic),
    ("190.0.0.0/8", Rir::Lacnic),
    ("191.0.0.0/8", Rir::Lacnic),
    ("193.0.0.0/8", Rir::Ripe),
    ("194.0.0.0/7", Rir::Ripe),
    ("196.0.0.0/8", Rir::Afrinic),
    ("197.0.0.0/8", Rir::Afrinic),
    ("198.0.0.0/7", Rir::Arin),
    ("200.0.0.0/7", Rir::Lacnic),
    ("202.0.0.0/7", Rir::Apnic),
    ("204.0.0.0/7", Rir::Arin),
    ("206.0.0.0/7", Rir::Arin),
    ("208.0.0.0/8", Rir::Arin),
    ("209.0.0.0/8", Rir::Arin),
    ("210.0.0.0/7", Rir::Apnic),
    ("212.0.0.0/7", Rir::Ripe),
    ("216.0.0.0/8", Rir::Arin),
    ("217.0.0.0/8", Rir::Ripe),
    ("218.0.0.0/7", Rir::Apnic),
    ("220.0.0.0/6", Rir::Apnic),
];

pub static IPV6_ALLOCATIONS: &[(&str, Rir)] = &[
    ("2001:200::/23", Rir::Apnic),
    ("2001:400::/23", Rir::Arin),
    ("2001:600::/23", Rir::Ripe),
    ("2001:800::/22", Rir::Ripe),
    ("2001:1200::/23", Rir::Lacnic),
    ("2001:4200::/23", Rir::Afrinic),
    ("2001:4800::/23", Rir::Arin),
    ("2003::/18", Rir::Ripe),
    ("2400::/12", Rir::Apnic),
    ("2600::/12", Rir::Arin),
    ("2610::/23", Rir::Arin),
    ("2620::/23", Rir::Arin),
    ("2800::/12", Rir::Lacnic),
    ("2a00::/12", Rir::Ripe),
    ("2c00::/12", Rir::Afrinic),
];

// AS number blocks (inclusive), coarse IANA delegations.
pub static ASN_ALLOCATIONS: &[(u32, u32, Rir)] = &[
    (1, 1876, Rir::Arin),
    (1877, 1901, Rir::Ripe),
    (2043, 2043, Rir::Ripe),
    (2047, 2047, Rir::Ripe),
    (2121, 2121, Rir::Ripe),
    (3154, 3353, Rir::Ripe),
    (4608, 4865, Rir::Apnic),
    (5377, 6143, Rir::Ripe),
    (7467, 7722, Rir::Apnic),
    (8192, 9215, Rir::Ripe),
    (9216, 10239, Rir::Apnic),
    (10240, 12287, Rir::Arin),
    (12288, 13311, Rir::Ripe),
    (13312, 15359, Rir::Arin),
    (15360, 16383, Rir::Ripe),
    (16384, 18431, Rir::Arin),
    (18432, 20479, Rir::Apnic),
    (20480, 21503, Rir::Ripe),
    (21504, 23551, Rir::Arin),
    (23552, 24575, Rir::Apnic),
    (24576, 25599, Rir::Ripe),
    (25600, 26623, Rir::Arin),
    (26624, 27647, Rir::Arin),
    (27648, 28671, Rir::Lacnic),
    (28672, 29695, Rir::Ripe),
    (29696, 30719, Rir::Ripe),
    (30720, 31743, Rir::Ripe),
    (31744, 32767, Rir::Arin),
    (32768, 33791, Rir::Arin),
    (33792, 35839, Rir::Afrinic),
    (35840, 36863, Rir::Ripe),
    (36864, 37887, Rir::Afrinic),
    (37888, 38911, Rir::Apnic),
    (38912, 39935, Rir::Apnic),
    (39936, 40959, Rir::Ripe),
    (40960, 45055, Rir::Arin),
    (45056, 46079, Rir::Apnic),
    (46080, 47103, Rir::Arin),
    (47104, 52223, Rir::Ripe),
    (52224, 53247, Rir::Lacnic),
    (53248, 55295, Rir::Arin),
    (55296, 56319, Rir::Apnic),
    (56320, 58367, Rir::Ripe),
    (58368, 59391, Rir::Apnic),
    (59392, 61439, Rir::Ripe),
    (61440, 61951, Rir::Lacnic),
    (61952, 62463, Rir::Ripe),
    (62464, 63487, Rir::Arin),
    (63488, 63999, Rir::Apnic),
    (131072, 141625, Rir::Apnic),
    (196608, 213403, Rir::Ripe),
    (262144, 273820, Rir::Lacnic),
    (327680, 329727, Rir::Afrinic),
    (393216, 402431, Rir::Arin),
];
