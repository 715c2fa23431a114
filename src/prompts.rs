use crate::request::TextOverlayConfig;

pub const CAPTION_BACKGROUND: &str = "Ảnh 1 (nền):";
pub const CAPTION_SUBJECT: &str = "Ảnh 2 (chủ thể):";
pub const CAPTION_ORIGINAL: &str = "Ảnh gốc:";

pub const BRANDING_LABEL_PREFIX: &str = "Phong cách: ";
pub const DEFAULT_STYLE: &str = "Chuyên nghiệp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrandingStyle {
    pub name: &'static str,
    pub description: &'static str,
    pub directive: &'static str,
}

pub const BRANDING_STYLES: &[BrandingStyle] = &[
    BrandingStyle {
        name: "Chuyên nghiệp",
        description: "Lý tưởng cho LinkedIn, hồ sơ công ty.",
        directive: "Tạo một bức ảnh chân dung chuyên nghiệp, lý tưởng cho LinkedIn hoặc hồ sơ công ty. Sử dụng ánh sáng studio mềm mại, phông nền trung tính hoặc văn phòng hiện đại (hơi mờ), và trang phục công sở lịch sự (vest, áo sơ mi). Giữ biểu cảm tự tin và chuyên nghiệp.",
    },
    BrandingStyle {
        name: "Sáng tạo",
        description: "Thể hiện cá tính nghệ sĩ, độc đáo.",
        directive: "Biến ảnh gốc thành một tác phẩm nghệ thuật sáng tạo. Sử dụng màu sắc sống động, các yếu tố trừu tượng hoặc họa tiết độc đáo ở hậu cảnh. Có thể thêm các hiệu ứng ánh sáng nghệ thuật. Phong cách phù hợp cho nghệ sĩ, nhà thiết kế.",
    },
    BrandingStyle {
        name: "Tối giản",
        description: "Phong cách sạch sẽ, hiện đại và tinh tế.",
        directive: "Tạo một bức ảnh chân dung theo phong cách tối giản, sạch sẽ. Sử dụng phông nền đơn sắc (trắng, xám nhạt, hoặc màu pastel). Ánh sáng tự nhiên, nhẹ nhàng. Trang phục đơn giản, không họa tiết. Tập trung hoàn toàn vào chủ thể.",
    },
    BrandingStyle {
        name: "Thân thiện",
        description: "Tạo cảm giác gần gũi, ấm áp.",
        directive: "Tạo một bức ảnh chân dung với không khí ấm áp, thân thiện và dễ tiếp cận. Sử dụng ánh sáng tự nhiên, ấm áp. Phông nền có thể là một quán cà phê ấm cúng, công viên cây xanh (hơi mờ). Chủ thể mặc trang phục thường ngày, thoải mái và mỉm cười tự nhiên.",
    },
    BrandingStyle {
        name: "Công nghệ",
        description: "Vẻ ngoài hiện đại, tương lai.",
        directive: "Tạo một bức ảnh chân dung mang phong cách công nghệ, hiện đại. Phông nền có thể là các đường mạch điện tử, mã code mờ ảo, hoặc không gian tương lai. Sử dụng ánh sáng với các tông màu xanh dương, tím neon. Trang phục gọn gàng, hiện đại.",
    },
];

/// Looks up a style, falling back to the default for unknown names.
pub fn branding_style(name: &str) -> &'static BrandingStyle {
    BRANDING_STYLES
        .iter()
        .find(|s| s.name == name)
        .unwrap_or(&BRANDING_STYLES[0])
}

pub fn branding_label(style_name: &str) -> String {
    format!("{BRANDING_LABEL_PREFIX}{style_name}")
}

/// Inverse of [`branding_label`].
pub fn parse_branding_label(label: &str) -> Option<&str> {
    label.strip_prefix(BRANDING_LABEL_PREFIX)
}

pub fn aspect_ratio_instruction(ratio: &str) -> String {
    let preset = match ratio {
        "1:1" => "Vuông (tỷ lệ 1:1)",
        "16:9" => "Ngang (tỷ lệ 16:9)",
        "9:16" => "Dọc (tỷ lệ 9:16)",
        "4:5" => "Dọc (tỷ lệ 4:5)",
        "3:4" => "Dọc (tỷ lệ 3:4)",
        "4:3" => "Ngang (tỷ lệ 4:3)",
        other => return format!("Tùy chỉnh (tỷ lệ {other})"),
    };
    preset.to_string()
}

/// Empty unless the overlay is enabled with non-blank text.
pub fn text_overlay_instruction(overlay: &TextOverlayConfig) -> String {
    if !overlay.is_active() {
        return String::new();
    }
    format!(
        r#"
**YÊU CẦU LỚP PHỦ VĂN BẢN (QUAN TRỌNG):**
- **Nội dung:** "{}"
- **Màu sắc:** "{}" (mã hex)
- **Kích thước:** {}
- **Kiểu chữ:** {}
- **Vị trí:** Đặt văn bản ở một vị trí hợp lý và thẩm mỹ trên ảnh, không che mất các chi tiết quan trọng của chủ thể. Văn bản phải dễ đọc và nổi bật.
"#,
        overlay.text,
        overlay.color,
        overlay.size.label(),
        overlay.font.label()
    )
}

pub fn fusion_instruction(prompt: &str, ratio: &str, overlay: &TextOverlayConfig) -> String {
    format!(
        r#"**YÊU CẦU CHỈNH SỬA ẢNH**

**ĐẦU VÀO:**
-   **Ảnh 1:** Nền/bối cảnh.
-   **Ảnh 2:** Chủ thể/đối tượng.
-   **Mô tả người dùng:** "{}"
-   **Khung hình đầu ra:** {}

**QUY TẮC BẮT BUỘC:**
1.  **GIỮ NGUYÊN KHUÔN MẶT:** Giữ lại 100% khuôn mặt gốc của chủ thể từ Ảnh 2. KHÔNG được thay đổi. Đây là ưu tiên số 1.
2.  **HỢP NHẤT:** Tách chủ thể từ Ảnh 2 và ghép vào bối cảnh của Ảnh 1.
3.  **CHẤT LƯỢNG:** Ảnh kết quả phải siêu thực, sắc nét, liền mạch. Ánh sáng, bóng đổ, màu sắc phải hài hòa.
{}
**THỰC HIỆN:** Dựa vào mô tả của người dùng, thực hiện yêu cầu và chỉ trả về kết quả là một hình ảnh duy nhất. Không thêm bất kỳ văn bản nào vào câu trả lời."#,
        prompt,
        aspect_ratio_instruction(ratio),
        text_overlay_instruction(overlay)
    )
}

pub fn single_edit_instruction(prompt: &str, ratio: &str, overlay: &TextOverlayConfig) -> String {
    format!(
        r#"**YÊU CẦU CHỈNH SỬA ẢNH**

**ĐẦU VÀO:**
-   **Ảnh gốc:** Ảnh cần chỉnh sửa.
-   **Mô tả người dùng:** "{}"
-   **Khung hình đầu ra:** {}

**QUY TẮC BẮT BUỘC:**
1.  **GIỮ NGUYÊN KHUÔN MẶT:** Nếu ảnh có người, giữ lại 100% khuôn mặt gốc. KHÔNG được thay đổi. Đây là ưu tiên số 1.
2.  **CHỈNH SỬA:** Áp dụng các thay đổi (nền, trang phục, phong cách...) theo mô tả của người dùng.
3.  **CHẤT LƯỢNG:** Ảnh kết quả phải siêu thực, sắc nét, và liền mạch.
{}
**THỰC HIỆN:** Dựa vào mô tả của người dùng, thực hiện yêu cầu và chỉ trả về kết quả là một hình ảnh duy nhất. Không thêm bất kỳ văn bản nào vào câu trả lời."#,
        prompt,
        aspect_ratio_instruction(ratio),
        text_overlay_instruction(overlay)
    )
}

pub fn branding_instruction(style_name: &str, ratio: &str, overlay: &TextOverlayConfig) -> String {
    let style = branding_style(style_name);
    format!(
        r#"**YÊU CẦU TẠO ẢNH THƯƠNG HIỆU CÁ NHÂN**

**ĐẦU VÀO:**
-   **Ảnh gốc:** Ảnh chân dung.
-   **Phong cách:** "{}" - {}
-   **Khung hình đầu ra:** {}

**QUY TẮC BẮT BUỘC:**
1.  **GIỮ NGUYÊN KHUÔN MẶT:** Giữ lại 100% khuôn mặt gốc của người trong ảnh. KHÔNG được thay đổi. Đây là ưu tiên số 1.
2.  **ÁP DỤNG PHONG CÁCH:** Biến đổi nền, trang phục, ánh sáng, màu sắc theo phong cách đã chọn.
3.  **CHẤT LƯỢNG:** Ảnh kết quả phải chuyên nghiệp, siêu thực, sắc nét.
{}
**THỰC HIỆN:** Áp dụng phong cách đã chọn vào ảnh gốc và chỉ trả về kết quả là một hình ảnh duy nhất. Không thêm bất kỳ văn bản nào vào câu trả lời."#,
        style_name,
        style.directive,
        aspect_ratio_instruction(ratio),
        text_overlay_instruction(overlay)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_style_falls_back_to_default_directive() {
        assert_eq!(branding_style("Không tồn tại").name, DEFAULT_STYLE);
        let text = branding_instruction("Không tồn tại", "1:1", &TextOverlayConfig::default());
        assert!(text.contains("\"Không tồn tại\""));
        assert!(text.contains(BRANDING_STYLES[0].directive));
    }

    #[test]
    fn branding_label_parses_back() {
        let label = branding_label("Công nghệ");
        assert_eq!(parse_branding_label(&label), Some("Công nghệ"));
        assert_eq!(parse_branding_label("đổi nền thành biển"), None);
    }

    #[test]
    fn overlay_directive_is_skipped_when_inactive() {
        let mut overlay = TextOverlayConfig {
            text: "Sale".into(),
            ..Default::default()
        };
        assert!(text_overlay_instruction(&overlay).is_empty());
        overlay.enabled = true;
        let text = text_overlay_instruction(&overlay);
        assert!(text.contains("\"Sale\""));
        assert!(text.contains("Vừa"));
        assert!(text.contains("Sans-serif"));
    }

    #[test]
    fn aspect_directives() {
        assert_eq!(aspect_ratio_instruction("9:16"), "Dọc (tỷ lệ 9:16)");
        assert_eq!(aspect_ratio_instruction("7:5"), "Tùy chỉnh (tỷ lệ 7:5)");
    }
}
