use collage::{
    CANVAS_HEIGHT, CANVAS_WIDTH, CollageConfiguration, CollageSession, Color, Compositor, FontSet, ImageResource,
    LayerSlot, RenderSettings, Transform, decode_image, export_png,
};
use egui::{Pos2, Rect, Vec2};
use image::{Rgba, RgbaImage};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const PINK: Rgba<u8> = Rgba([0xfe, 0xcd, 0xd3, 255]);
const PHOTO: Rgba<u8> = Rgba([30, 90, 200, 255]);

fn encoded(w: u32, h: u32, px: Rgba<u8>) -> Vec<u8> {
    export_png(&RgbaImage::from_pixel(w, h, px), "fixture").unwrap().bytes
}

fn compositor() -> Compositor {
    Compositor::new(RenderSettings::default(), FontSet::empty())
}

/// Horizontal extent of the photo along row `y`.
fn photo_span(frame: &RgbaImage, y: u32) -> Option<(u32, u32)> {
    let xs: Vec<u32> = (0..frame.width()).filter(|&x| *frame.get_pixel(x, y) == PHOTO).collect();
    Some((*xs.first()?, *xs.last()?))
}

#[test]
fn portrait_scenario_from_encoded_bytes() {
    let mut config = CollageConfiguration::default();
    config.name = "たろう".to_string();
    config.furigana = String::new();
    config.bg_color1 = Color::from_hex("#ffffff").unwrap();
    config.bg_color2 = Color::from_hex("#fecdd3").unwrap();

    let primary = decode_image(&encoded(200, 300, PHOTO)).unwrap();
    let frame = compositor().render(&config, Some(&primary), None);
    assert_eq!(frame.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));

    // Contained in 740×1040: about 693 wide and 1040 tall, centered.
    let (x0, x1) = photo_span(&frame, 600).unwrap();
    let width = x1 - x0 + 1;
    assert!((688..=694).contains(&width), "width {}", width);
    assert!(((x0 + x1) as i32 - 899).abs() <= 1);

    let column: Vec<u32> = (0..CANVAS_HEIGHT).filter(|&y| *frame.get_pixel(450, y) == PHOTO).collect();
    let height = column.last().unwrap() - column.first().unwrap() + 1;
    assert!((1034..=1040).contains(&height), "height {}", height);

    // Outside the portrait: white background above, band visible at the side.
    assert_eq!(*frame.get_pixel(450, 40), WHITE);
    assert_eq!(*frame.get_pixel(40, 700), PINK);
}

#[test]
fn portrait_scenario_draws_name_but_no_furigana() {
    let mut config = CollageConfiguration::default();
    config.name = "たろう".to_string();
    config.furigana = String::new();
    config.bg_color1 = Color::from_hex("#ffffff").unwrap();
    config.bg_color2 = Color::from_hex("#fecdd3").unwrap();
    let primary = decode_image(&encoded(200, 300, PHOTO)).unwrap();

    let fonts = FontSet::from_bytes(include_bytes!("fixtures/DejaVuSans-Bold.ttf").to_vec()).unwrap();
    let lettered = Compositor::new(RenderSettings::default(), fonts).render(&config, Some(&primary), None);
    let bare = compositor().render(&config, Some(&primary), None);

    // Nothing in the furigana line.
    for y in 0..118 {
        for x in 0..CANVAS_WIDTH {
            assert_eq!(lettered.get_pixel(x, y), bare.get_pixel(x, y), "({}, {})", x, y);
        }
    }
    // The name line is inked over the portrait, in the dark fill.
    let dark = (118..250)
        .flat_map(|y| (0..CANVAS_WIDTH).map(move |x| (x, y)))
        .filter(|&(x, y)| {
            let p = lettered.get_pixel(x, y);
            p[0] < 40 && p[1] < 40 && p[2] < 40
        })
        .count();
    assert!(dark > 100, "dark pixels {}", dark);
    assert!((250..CANVAS_HEIGHT).all(|y| lettered.get_pixel(450, y) == bare.get_pixel(450, y)));
}

#[test]
fn render_twice_is_byte_identical() {
    let mut config = CollageConfiguration::default();
    config.primary_transform = Transform { x: -40.0, y: 25.0, scale: 1.4, rotation: -12.0 };
    config.secondary_transform = Transform { x: 100.0, y: 0.0, scale: 0.7, rotation: 30.0 };
    let p = decode_image(&encoded(160, 240, PHOTO)).unwrap();
    let s = decode_image(&encoded(300, 120, Rgba([240, 60, 10, 255]))).unwrap();
    let c = compositor();
    assert_eq!(c.render(&config, Some(&p), Some(&s)), c.render(&config, Some(&p), Some(&s)));
}

#[test]
fn no_images_means_background_band_and_text_only() {
    let c = compositor();
    let plain = c.render(&CollageConfiguration::default(), None, None);

    let mut moved = CollageConfiguration::default();
    moved.primary_transform = Transform { x: 999.0, y: -999.0, scale: 0.1, rotation: 180.0 };
    moved.secondary_transform = Transform { x: 1.0, y: 2.0, scale: 3.0, rotation: 4.0 };
    assert_eq!(plain, c.render(&moved, None, None));

    let distinct: std::collections::HashSet<[u8; 4]> = plain.pixels().map(|p| p.0).collect();
    // Two flat colors plus the anti-aliased band edge.
    assert!(distinct.contains(&WHITE.0) && distinct.contains(&PINK.0));
    assert!(distinct.iter().all(|p| p[3] == 255));
}

#[test]
fn session_end_to_end() {
    let mut session = CollageSession::new(compositor());
    session.mount(Rect::from_min_size(Pos2::new(10.0, 10.0), Vec2::new(300.0, 400.0)));
    session.set_name("たろう");
    session.set_furigana("");
    session.select_image(LayerSlot::Primary, ImageResource::new("photo.png", encoded(200, 300, PHOTO)));
    session.select_image(LayerSlot::Secondary, ImageResource::new("bad.bin", b"corrupt".to_vec()));
    session.wait_for_decodes();

    // The corrupt pattern stays absent, the portrait is drawn.
    assert!(session.decoded(LayerSlot::Secondary).is_none());
    assert_eq!(*session.frame().unwrap().get_pixel(450, 600), PHOTO);

    let file = session.export().unwrap();
    assert_eq!(file.file_name, "collage_たろう.png");
    let back = image::load_from_memory(&file.bytes).unwrap().to_rgba8();
    assert_eq!(&back, session.frame().unwrap());
}

#[test]
fn superseded_selection_never_reaches_the_compositor() {
    let mut session = CollageSession::new(compositor());
    session.mount(Rect::from_min_size(Pos2::ZERO, Vec2::new(900.0, 1200.0)));
    session.select_image(LayerSlot::Primary, ImageResource::new("old.png", encoded(40, 40, Rgba([255, 0, 0, 255]))));
    session.select_image(LayerSlot::Primary, ImageResource::new("new.png", encoded(40, 40, PHOTO)));
    session.wait_for_decodes();
    assert_eq!(session.config().primary_image.as_ref().map(|r| r.label.as_str()), Some("new.png"));
    assert_eq!(*session.frame().unwrap().get_pixel(450, 600), PHOTO);
}
