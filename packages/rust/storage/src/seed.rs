//! Starter venues loaded by `expofinder db seed`.

use expofinder_shared::NewVenue;

struct SeedVenue {
    name: &'static str,
    address: &'static str,
    latitude: f64,
    longitude: f64,
    website: &'static str,
}

const ANTWERP: &[SeedVenue] = &[
    SeedVenue {
        name: "KMSKA - Royal Museum of Fine Arts Antwerp",
        address: "Leopold De Waelplaats 2, 2000 Antwerpen",
        latitude: 51.2171,
        longitude: 4.4067,
        website: "https://kmska.be",
    },
    SeedVenue {
        name: "M HKA - Museum of Contemporary Art Antwerp",
        address: "Leuvenstraat 32, 2000 Antwerpen",
        latitude: 51.2093,
        longitude: 4.4038,
        website: "https://www.muhka.be",
    },
    SeedVenue {
        name: "MoMu - Fashion Museum Antwerp",
        address: "Nationalestraat 28, 2000 Antwerpen",
        latitude: 51.2161,
        longitude: 4.4015,
        website: "https://www.momu.be",
    },
    SeedVenue {
        name: "Museum Plantin-Moretus",
        address: "Vrijdagmarkt 22, 2000 Antwerpen",
        latitude: 51.2195,
        longitude: 4.4006,
        website: "https://www.museumplantinmoretus.be",
    },
    SeedVenue {
        name: "Rubens House",
        address: "Wapper 9-11, 2000 Antwerpen",
        latitude: 51.2189,
        longitude: 4.4053,
        website: "https://www.rubenshuis.be",
    },
];

/// The initial venue set; each one is indexed from its website.
pub(crate) fn initial_venues() -> Vec<NewVenue> {
    ANTWERP
        .iter()
        .map(|v| NewVenue {
            name: v.name.into(),
            city: "Antwerp".into(),
            country: "Belgium".into(),
            address: Some(v.address.into()),
            latitude: Some(v.latitude),
            longitude: Some(v.longitude),
            website_url: Some(v.website.into()),
        })
        .collect()
}
